mod support;

use std::collections::HashSet;

use proptest::prelude::*;

use asmgr::agents::AgentKind;
use asmgr::core::{display_order, reorder, CreateOutcome, CreateRequest, Direction};
use asmgr::domain::{FollowedWindow, Group, Instance, Settings, SplitFocus};
use asmgr::store::Store;
use asmgr::ticker::TickScope;
use support::Harness;

fn arb_kind() -> impl Strategy<Value = AgentKind> {
    proptest::sample::select(AgentKind::ALL.to_vec())
}

fn arb_direction() -> impl Strategy<Value = Direction> {
    prop_oneof![Just(Direction::Up), Just(Direction::Down)]
}

fn arb_window() -> impl Strategy<Value = FollowedWindow> {
    (0u32..4, arb_kind(), "[a-z]{0,3}", any::<bool>()).prop_map(|(index, agent, token, auto_yes)| {
        FollowedWindow {
            index,
            name: format!("tab{}", index),
            agent,
            custom_command: None,
            resume_session_id: token,
            auto_yes,
            notes: None,
        }
    })
}

fn arb_instance() -> impl Strategy<Value = Instance> {
    (
        arb_kind(),
        "[a-z]{1,8}",
        "[a-z]{0,4}",
        proptest::option::of(0usize..3),
        any::<bool>(),
        proptest::collection::vec(arb_window(), 0..3),
    )
        .prop_map(|(agent, name, token, group, favorite, windows)| {
            let mut inst = Instance::new(name, "/work", agent);
            inst.resume_session_id = token;
            inst.group_id = group.map(|g| format!("g{}", g));
            inst.favorite = favorite;
            inst.followed_windows = windows;
            inst
        })
}

fn arb_group() -> impl Strategy<Value = Group> {
    (
        "[a-z]{1,8}",
        proptest::option::of("[a-z]{3,6}"),
        proptest::option::of("[a-z]{3,6}"),
        any::<bool>(),
        any::<bool>(),
    )
        .prop_map(|(name, color, bg_color, full_row_color, collapsed)| Group {
            color,
            bg_color,
            full_row_color,
            collapsed,
            ..Group::new(name)
        })
}

fn arb_settings() -> impl Strategy<Value = Settings> {
    (
        any::<[bool; 4]>(),
        prop_oneof![Just(SplitFocus::List), Just(SplitFocus::Preview)],
        proptest::option::of("[a-z0-9]{4,8}"),
        0usize..32,
    )
        .prop_map(|(flags, split_focus, marked_session_id, cursor)| Settings {
            compact_list: flags[0],
            hide_status_lines: flags[1],
            show_agent_icons: flags[2],
            split_view: flags[3],
            split_focus,
            marked_session_id,
            cursor,
        })
}

fn groups(collapsed: &[bool]) -> Vec<Group> {
    collapsed
        .iter()
        .enumerate()
        .map(|(n, &collapsed)| Group {
            id: format!("g{}", n),
            collapsed,
            ..Group::new(format!("group {}", n))
        })
        .collect()
}

fn section_sequence(instances: &[Instance], groups: &[Group]) -> Vec<Option<String>> {
    display_order(instances, groups)
        .into_iter()
        .map(|idx| {
            instances[idx]
                .group_id
                .clone()
                .filter(|g| groups.iter().any(|known| known.id == *g))
        })
        .collect()
}

proptest! {
    #[test]
    fn reorder_only_permutes_within_a_section(
        mut instances in proptest::collection::vec(arb_instance(), 1..8),
        collapsed in proptest::collection::vec(any::<bool>(), 0..3),
        moves in proptest::collection::vec((0usize..8, arb_direction()), 0..16),
    ) {
        let groups = groups(&collapsed);
        let mut ids: Vec<String> = instances.iter().map(|i| i.id.clone()).collect();
        ids.sort();
        let sections = section_sequence(&instances, &groups);

        for (pick, dir) in moves {
            let id = instances[pick % instances.len()].id.clone();
            reorder(&mut instances, &groups, &id, dir);
        }

        let mut after: Vec<String> = instances.iter().map(|i| i.id.clone()).collect();
        after.sort();
        prop_assert_eq!(after, ids);
        prop_assert_eq!(section_sequence(&instances, &groups), sections);
    }

    #[test]
    fn saved_state_loads_back_normalized(
        instances in proptest::collection::vec(arb_instance(), 0..6),
        groups in proptest::collection::vec(arb_group(), 0..4),
        settings in arb_settings(),
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::new(dir.path());
        store.save(None, &instances, &groups).unwrap();
        store.save_settings(None, &settings).unwrap();

        let state = store.load_all(None).unwrap();
        prop_assert_eq!(&state.groups, &groups);
        prop_assert_eq!(&state.settings, &settings);

        let loaded = state.instances;
        let expected: Vec<Instance> = instances
            .into_iter()
            .map(|mut inst| {
                inst.normalize();
                inst
            })
            .collect();
        prop_assert_eq!(&loaded, &expected);

        for inst in &loaded {
            prop_assert!(inst.followed_windows.iter().all(|w| w.index != 0));
            if !inst.agent.profile().supports_resume() {
                prop_assert!(inst.resume_session_id.is_empty());
            }
            for window in &inst.followed_windows {
                if !window.agent.profile().supports_resume() {
                    prop_assert!(window.resume_session_id.is_empty());
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
enum Op {
    Create,
    Stop(usize),
    Start(usize),
    Kill(usize),
    Delete(usize),
    Tick,
}

impl Op {
    fn slot(&self) -> usize {
        match self {
            Op::Stop(n) | Op::Start(n) | Op::Kill(n) | Op::Delete(n) => *n,
            Op::Create | Op::Tick => 0,
        }
    }
}

async fn create(core: &mut asmgr::SessionCore<support::FakeMux>) {
    let req = CreateRequest::new("agent", "/work", AgentKind::Terminal);
    assert!(matches!(core.create(req).await, Ok(CreateOutcome::Started(_))));
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        Just(Op::Create),
        (0usize..4).prop_map(Op::Stop),
        (0usize..4).prop_map(Op::Start),
        (0usize..4).prop_map(Op::Kill),
        (0usize..4).prop_map(Op::Delete),
        Just(Op::Tick),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(48))]

    /// After a full tick, an instance is running exactly when its session
    /// exists, whatever happened to tmux in between.
    #[test]
    fn running_matches_live_sessions_after_a_tick(ops in proptest::collection::vec(arb_op(), 1..12)) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let h = Harness::new();
        let mut core = h.core();

        runtime.block_on(async {
            for op in ops {
                let ids: Vec<String> = core.instances().iter().map(|i| i.id.clone()).collect();
                let Some(target) = ids.get(op.slot() % ids.len().max(1)).cloned() else {
                    if let Op::Create = op {
                        create(&mut core).await;
                    }
                    continue;
                };
                match op {
                    Op::Create => create(&mut core).await,
                    Op::Stop(_) => core.stop(&target).await.unwrap(),
                    Op::Start(_) => core.start(&target).await.unwrap(),
                    Op::Kill(_) => h.mux.drop_session(&format!("asmgr-{}", target)),
                    Op::Delete(_) => core.delete(&target).await.unwrap(),
                    Op::Tick => core.tick(TickScope::All, None).await,
                }
            }
            core.tick(TickScope::All, None).await;
        });

        let live: HashSet<String> = h.mux.session_names().into_iter().collect();
        for inst in core.instances() {
            prop_assert_eq!(inst.is_running(), live.contains(&format!("asmgr-{}", inst.id)));
        }
        prop_assert!(core.orphans().is_empty());
    }
}

#[derive(Debug, Clone)]
enum GroupEdit {
    Rename(usize),
    Recolor(usize, bool),
    Collapse(usize),
    Reorder(usize, Direction),
}

fn arb_group_edit() -> impl Strategy<Value = GroupEdit> {
    prop_oneof![
        (0usize..3).prop_map(GroupEdit::Rename),
        (0usize..3, any::<bool>()).prop_map(|(g, full)| GroupEdit::Recolor(g, full)),
        (0usize..3).prop_map(GroupEdit::Collapse),
        (0usize..3, arb_direction()).prop_map(|(g, dir)| GroupEdit::Reorder(g, dir)),
    ]
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Renaming, recoloring, collapsing and reordering groups never moves an
    /// instance between groups.
    #[test]
    fn group_edits_keep_membership(
        members in proptest::collection::vec(proptest::option::of(0usize..3), 1..6),
        edits in proptest::collection::vec(arb_group_edit(), 1..12),
    ) {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let h = Harness::new();
        let mut core = h.core();

        let group_ids: Vec<String> = (0..3)
            .map(|n| core.add_group(&format!("group {}", n)).unwrap())
            .collect();
        for member in &members {
            runtime.block_on(create(&mut core));
            let id = core.instances().last().unwrap().id.clone();
            let group = member.map(|g| group_ids[g].as_str());
            core.assign_to_group(&id, group).unwrap();
        }
        let membership = |instances: &[Instance]| -> Vec<(String, Option<String>)> {
            instances.iter().map(|i| (i.id.clone(), i.group_id.clone())).collect()
        };
        let before = membership(core.instances());

        for (n, edit) in edits.into_iter().enumerate() {
            match edit {
                GroupEdit::Rename(g) => core.rename_group(&group_ids[g], &format!("renamed {}", n)).unwrap(),
                GroupEdit::Recolor(g, full) => core
                    .set_group_color(&group_ids[g], Some("red".into()), None, full)
                    .unwrap(),
                GroupEdit::Collapse(g) => {
                    core.toggle_group_collapsed(&group_ids[g]).unwrap();
                }
                GroupEdit::Reorder(g, dir) => {
                    core.reorder_group(&group_ids[g], dir).unwrap();
                }
            }
        }

        prop_assert_eq!(membership(core.instances()), before.clone());
        let saved = Store::new(h.root()).load_instances(None).unwrap();
        prop_assert_eq!(membership(&saved), before);
        let mut ids: Vec<&str> = core.groups().iter().map(|g| g.id.as_str()).collect();
        ids.sort();
        let mut expected: Vec<&str> = group_ids.iter().map(String::as_str).collect();
        expected.sort();
        prop_assert_eq!(ids, expected);
    }
}
