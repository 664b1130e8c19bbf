//! Pure model mutations over instances and groups. Each one validates,
//! mutates, then saves; a failed save rolls the mutation back.

use tracing::debug;

use super::SessionCore;
use crate::domain::{Group, Instance, FAVORITES_GROUP_ID};
use crate::error::CoreError;
use crate::tmux::Multiplexer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

/// One row of the structural list: ungrouped instances first, then each
/// group header followed by its members unless the group is collapsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Row {
    Header(String),
    Instance(String),
}

/// Structural rows for a model. The favorites section is a view over these
/// and never takes part in reordering.
pub fn structural_rows(instances: &[Instance], groups: &[Group]) -> Vec<Row> {
    let known = |gid: &Option<String>| {
        gid.as_deref()
            .is_some_and(|g| groups.iter().any(|group| group.id == g))
    };

    let mut rows: Vec<Row> = instances
        .iter()
        .filter(|i| !known(&i.group_id))
        .map(|i| Row::Instance(i.id.clone()))
        .collect();

    for group in groups {
        rows.push(Row::Header(group.id.clone()));
        if group.collapsed {
            continue;
        }
        rows.extend(
            instances
                .iter()
                .filter(|i| i.group_id.as_deref() == Some(group.id.as_str()))
                .map(|i| Row::Instance(i.id.clone())),
        );
    }
    rows
}

/// Instance indices in display order, including members of collapsed groups.
pub fn display_order(instances: &[Instance], groups: &[Group]) -> Vec<usize> {
    let in_group = |i: &Instance, gid: &str| i.group_id.as_deref() == Some(gid);
    let grouped = |i: &Instance| groups.iter().any(|g| in_group(i, &g.id));

    let mut order: Vec<usize> = (0..instances.len())
        .filter(|&idx| !grouped(&instances[idx]))
        .collect();
    for group in groups {
        order.extend((0..instances.len()).filter(|&idx| in_group(&instances[idx], &group.id)));
    }
    order
}

/// Swap `id` with its neighbour row. Returns false when the neighbour is a
/// group header or the list edge.
pub fn reorder(instances: &mut [Instance], groups: &[Group], id: &str, dir: Direction) -> bool {
    let rows = structural_rows(instances, groups);
    let Some(pos) = rows.iter().position(|r| matches!(r, Row::Instance(i) if i == id)) else {
        return false;
    };
    let neighbour = match dir {
        Direction::Up => pos.checked_sub(1).and_then(|p| rows.get(p)),
        Direction::Down => rows.get(pos + 1),
    };
    let Some(Row::Instance(other)) = neighbour else {
        return false;
    };

    let a = instances.iter().position(|i| i.id == id);
    let b = instances.iter().position(|i| &i.id == other);
    match (a, b) {
        (Some(a), Some(b)) => {
            instances.swap(a, b);
            true
        }
        _ => false,
    }
}

impl<M: Multiplexer> SessionCore<M> {
    pub fn rows(&self) -> Vec<Row> {
        structural_rows(&self.instances, &self.groups)
    }

    /// Run a model mutation and save it, restoring the previous model if the
    /// save fails.
    fn mutate<T>(
        &mut self,
        f: impl FnOnce(&mut Vec<Instance>, &mut Vec<Group>) -> Result<T, CoreError>,
    ) -> Result<T, CoreError> {
        let instances = self.instances.clone();
        let groups = self.groups.clone();
        let out = f(&mut self.instances, &mut self.groups)?;
        if let Err(e) = self.persist() {
            self.instances = instances;
            self.groups = groups;
            return Err(e);
        }
        Ok(out)
    }

    fn mutate_instance<T>(
        &mut self,
        id: &str,
        f: impl FnOnce(&mut Instance) -> T,
    ) -> Result<T, CoreError> {
        let idx = self.index_of(id)?;
        self.mutate(|instances, _| Ok(f(&mut instances[idx])))
    }

    pub fn reorder_instance(&mut self, id: &str, dir: Direction) -> Result<bool, CoreError> {
        self.index_of(id)?;
        let mut instances = self.instances.clone();
        if !reorder(&mut instances, &self.groups, id, dir) {
            debug!(id, ?dir, "reorder blocked by group boundary");
            return Ok(false);
        }
        self.mutate(|current, _| {
            *current = instances;
            Ok(true)
        })
    }

    /// Rename an instance. The session name is derived from the id, so only
    /// the status bar label changes in tmux.
    pub async fn rename_instance(&mut self, id: &str, name: &str) -> Result<(), CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::invariant("instance name cannot be empty"));
        }
        self.mutate_instance(id, |inst| inst.name = name.to_string())?;
        let idx = self.index_of(id)?;
        if self.instances[idx].is_running() {
            self.refresh_status_bar(idx).await;
        }
        Ok(())
    }

    pub fn set_notes(&mut self, id: &str, notes: &str) -> Result<(), CoreError> {
        let notes = Some(notes.trim().to_string()).filter(|n| !n.is_empty());
        self.mutate_instance(id, |inst| inst.notes = notes)
    }

    pub fn set_color(
        &mut self,
        id: &str,
        color: Option<String>,
        bg_color: Option<String>,
        full_row: bool,
    ) -> Result<(), CoreError> {
        self.mutate_instance(id, |inst| {
            inst.color = color;
            inst.bg_color = bg_color;
            inst.full_row_color = full_row;
        })
    }

    /// Returns the new favorite flag.
    pub fn toggle_favorite(&mut self, id: &str) -> Result<bool, CoreError> {
        self.mutate_instance(id, |inst| {
            inst.favorite = !inst.favorite;
            inst.favorite
        })
    }

    pub fn add_group(&mut self, name: &str) -> Result<String, CoreError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(CoreError::invariant("group name cannot be empty"));
        }
        let group = Group::new(name);
        let id = group.id.clone();
        self.mutate(|_, groups| {
            groups.push(group);
            Ok(())
        })?;
        Ok(id)
    }

    pub fn rename_group(&mut self, id: &str, name: &str) -> Result<(), CoreError> {
        let name = name.trim().to_string();
        if name.is_empty() {
            return Err(CoreError::invariant("group name cannot be empty"));
        }
        let gidx = self.group_index(id)?;
        self.mutate(|_, groups| {
            groups[gidx].name = name;
            Ok(())
        })
    }

    /// Remove a group; its members become ungrouped.
    pub fn remove_group(&mut self, id: &str) -> Result<(), CoreError> {
        let gidx = self.group_index(id)?;
        self.mutate(|instances, groups| {
            for inst in instances.iter_mut() {
                if inst.group_id.as_deref() == Some(id) {
                    inst.group_id = None;
                }
            }
            groups.remove(gidx);
            Ok(())
        })
    }

    pub fn set_group_color(
        &mut self,
        id: &str,
        color: Option<String>,
        bg_color: Option<String>,
        full_row: bool,
    ) -> Result<(), CoreError> {
        let gidx = self.group_index(id)?;
        self.mutate(|_, groups| {
            let group = &mut groups[gidx];
            group.color = color;
            group.bg_color = bg_color;
            group.full_row_color = full_row;
            Ok(())
        })
    }

    /// Returns the new collapsed flag.
    pub fn toggle_group_collapsed(&mut self, id: &str) -> Result<bool, CoreError> {
        let gidx = self.group_index(id)?;
        self.mutate(|_, groups| {
            groups[gidx].collapsed = !groups[gidx].collapsed;
            Ok(groups[gidx].collapsed)
        })
    }

    /// Swap a group with its neighbour. Returns false at the list edge.
    pub fn reorder_group(&mut self, id: &str, dir: Direction) -> Result<bool, CoreError> {
        let gidx = self.group_index(id)?;
        let other = match dir {
            Direction::Up => gidx.checked_sub(1),
            Direction::Down => Some(gidx + 1).filter(|&o| o < self.groups.len()),
        };
        let Some(other) = other else {
            return Ok(false);
        };
        self.mutate(|_, groups| {
            groups.swap(gidx, other);
            Ok(true)
        })
    }

    /// Move an instance into a group, or out of all groups with `None`.
    /// The favorites id sets the favorite flag instead.
    pub fn assign_to_group(&mut self, id: &str, group_id: Option<&str>) -> Result<(), CoreError> {
        match group_id {
            Some(FAVORITES_GROUP_ID) => self.mutate_instance(id, |inst| inst.favorite = true),
            Some(gid) => {
                self.group_index(gid)?;
                let gid = gid.to_string();
                self.mutate_instance(id, |inst| inst.group_id = Some(gid))
            }
            None => self.mutate_instance(id, |inst| inst.group_id = None),
        }
    }

    fn group_index(&self, id: &str) -> Result<usize, CoreError> {
        if id == FAVORITES_GROUP_ID {
            return Err(CoreError::invariant("the favorites group is virtual"));
        }
        self.groups
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| CoreError::UnknownGroup(id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::AgentKind;

    fn inst(name: &str, group: Option<&str>) -> Instance {
        let mut i = Instance::new(name, "/tmp", AgentKind::Terminal);
        i.group_id = group.map(str::to_string);
        i
    }

    fn group(id: &str, collapsed: bool) -> Group {
        Group {
            id: id.to_string(),
            collapsed,
            ..Group::new(id)
        }
    }

    fn names(instances: &[Instance]) -> Vec<&str> {
        instances.iter().map(|i| i.name.as_str()).collect()
    }

    #[test]
    fn rows_put_ungrouped_first_and_hide_collapsed_members() {
        let groups = vec![group("g1", false), group("g2", true)];
        let instances = vec![inst("a", Some("g1")), inst("b", None), inst("c", Some("g2"))];

        let rows = structural_rows(&instances, &groups);
        assert_eq!(
            rows,
            vec![
                Row::Instance(instances[1].id.clone()),
                Row::Header("g1".into()),
                Row::Instance(instances[0].id.clone()),
                Row::Header("g2".into()),
            ]
        );
        assert_eq!(display_order(&instances, &groups), vec![1, 0, 2]);
    }

    #[test]
    fn dangling_group_reference_counts_as_ungrouped() {
        let instances = vec![inst("a", Some("gone"))];
        let rows = structural_rows(&instances, &[]);
        assert_eq!(rows, vec![Row::Instance(instances[0].id.clone())]);
    }

    #[test]
    fn reorder_swaps_within_a_group() {
        let groups = vec![group("g1", false)];
        let mut instances = vec![inst("a", Some("g1")), inst("x", None), inst("b", Some("g1"))];
        let id = instances[2].id.clone();

        assert!(reorder(&mut instances, &groups, &id, Direction::Up));
        assert_eq!(names(&instances), vec!["b", "x", "a"]);
    }

    #[test]
    fn reorder_stops_at_group_header_and_edges() {
        let groups = vec![group("g1", false)];
        let mut instances = vec![inst("a", None), inst("b", Some("g1"))];
        let a = instances[0].id.clone();
        let b = instances[1].id.clone();

        assert!(!reorder(&mut instances, &groups, &a, Direction::Up));
        assert!(!reorder(&mut instances, &groups, &a, Direction::Down));
        assert!(!reorder(&mut instances, &groups, &b, Direction::Up));
        assert!(!reorder(&mut instances, &groups, &b, Direction::Down));
        assert_eq!(names(&instances), vec!["a", "b"]);
    }
}
