use std::collections::HashMap;

use super::catalog::{structural_rows, Row};
use super::SessionCore;
use crate::agents::AgentKind;
use crate::domain::{Group, Instance, Status, FAVORITES_GROUP_ID};
use crate::tmux::{Activity, Multiplexer};

/// Read-only snapshot handed to the TUI after every tick.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewModel {
    pub project: Option<String>,
    pub rows: Vec<RowView>,
    pub instances: HashMap<String, InstanceView>,
    pub groups: Vec<Group>,
    pub selection: Option<String>,
    /// Captured text of the selected instance's displayed window.
    pub preview: String,
    pub activity: HashMap<String, Activity>,
    pub orphans: Vec<String>,
}

impl ViewModel {
    pub fn selected(&self) -> Option<&InstanceView> {
        self.selection.as_ref().and_then(|id| self.instances.get(id))
    }

    /// Instance id shown on a row, if the row is not a header.
    pub fn row_instance(&self, row: usize) -> Option<&str> {
        match self.rows.get(row)? {
            RowView::Instance { id, .. } => Some(id),
            RowView::Header { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowView {
    Header {
        group_id: String,
        name: String,
        collapsed: bool,
        members: usize,
    },
    Instance {
        id: String,
        /// Row sits in the favorites section rather than its own place.
        favorite_section: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceView {
    pub id: String,
    pub name: String,
    pub path: String,
    pub agent: AgentKind,
    pub status: Status,
    pub activity: Activity,
    pub last_line: String,
    pub favorite: bool,
    pub auto_yes: bool,
    pub color: Option<String>,
    pub notes: Option<String>,
    pub tabs: Vec<TabView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabView {
    pub index: u32,
    pub name: String,
    pub agent: AgentKind,
    pub auto_yes: bool,
    pub dead: bool,
    pub selected: bool,
}

impl<M: Multiplexer> SessionCore<M> {
    pub fn view(&self, selection: Option<&str>) -> ViewModel {
        let instances: HashMap<String, InstanceView> = self
            .instances
            .iter()
            .map(|i| (i.id.clone(), instance_view(i)))
            .collect();
        let activity = self
            .instances
            .iter()
            .map(|i| (i.id.clone(), i.runtime.activity))
            .collect();
        let selection = selection
            .filter(|id| instances.contains_key(*id))
            .map(ToOwned::to_owned);
        let preview = selection
            .as_deref()
            .and_then(|id| self.instance(id))
            .map(|i| i.runtime.preview.clone())
            .unwrap_or_default();

        ViewModel {
            project: self.project.clone(),
            rows: rows(&self.instances, &self.groups),
            instances,
            groups: self.groups.clone(),
            selection,
            preview,
            activity,
            orphans: self.orphans.clone(),
        }
    }
}

fn rows(instances: &[Instance], groups: &[Group]) -> Vec<RowView> {
    let mut out = Vec::new();
    let favorites: Vec<&Instance> = instances.iter().filter(|i| i.favorite).collect();
    if !favorites.is_empty() {
        out.push(RowView::Header {
            group_id: FAVORITES_GROUP_ID.to_string(),
            name: "Favorites".to_string(),
            collapsed: false,
            members: favorites.len(),
        });
        out.extend(favorites.iter().map(|i| RowView::Instance {
            id: i.id.clone(),
            favorite_section: true,
        }));
    }

    for row in structural_rows(instances, groups) {
        out.push(match row {
            Row::Instance(id) => RowView::Instance {
                id,
                favorite_section: false,
            },
            Row::Header(gid) => {
                let group = groups.iter().find(|g| g.id == gid);
                RowView::Header {
                    name: group.map(|g| g.name.clone()).unwrap_or_default(),
                    collapsed: group.is_some_and(|g| g.collapsed),
                    members: instances
                        .iter()
                        .filter(|i| i.group_id.as_deref() == Some(gid.as_str()))
                        .count(),
                    group_id: gid,
                }
            }
        });
    }
    out
}

fn instance_view(inst: &Instance) -> InstanceView {
    let dead = |index: u32| {
        inst.runtime
            .windows
            .iter()
            .any(|w| w.index == index && w.dead)
    };
    let mut tabs = vec![TabView {
        index: 0,
        name: inst.agent.label().to_lowercase(),
        agent: inst.agent,
        auto_yes: inst.auto_yes,
        dead: dead(0),
        selected: inst.runtime.selected_window == 0,
    }];
    tabs.extend(inst.followed_windows.iter().map(|w| TabView {
        index: w.index,
        name: w.name.clone(),
        agent: w.agent,
        auto_yes: w.auto_yes,
        dead: dead(w.index),
        selected: inst.runtime.selected_window == w.index,
    }));

    InstanceView {
        id: inst.id.clone(),
        name: inst.name.clone(),
        path: inst.path.display().to_string(),
        agent: inst.agent,
        status: inst.runtime.status,
        activity: inst.runtime.activity,
        last_line: inst.runtime.last_line.clone(),
        favorite: inst.favorite,
        auto_yes: inst.auto_yes,
        color: inst.color.clone(),
        notes: inst.notes.clone(),
        tabs,
    }
}
