mod support;

use asmgr::agents::AgentKind;
use asmgr::core::{CreateOutcome, CreateRequest};
use asmgr::domain::Status;
use asmgr::store::Store;
use asmgr::ticker::TickScope;
use asmgr::tmux::{Activity, MuxError};
use asmgr::{CoreError, SessionCore};
use support::{FakeMux, Harness};

async fn create(core: &mut SessionCore<FakeMux>, name: &str) -> String {
    match core
        .create(CreateRequest::new(name, "/work/api", AgentKind::Claude))
        .await
        .unwrap()
    {
        CreateOutcome::Started(id) => id,
        other => panic!("expected a started instance, got {:?}", other),
    }
}

fn session(id: &str) -> String {
    format!("asmgr-{}", id)
}

#[tokio::test]
async fn killed_sessions_are_marked_stopped() {
    let h = Harness::new();
    let mut core = h.core();
    let id = create(&mut core, "api").await;
    h.mux.set_pane(&session(&id), 0, "working");
    core.tick(TickScope::All, None).await;
    assert!(!core.instance(&id).unwrap().runtime.preview.is_empty());

    h.mux.drop_session(&session(&id));
    core.tick(TickScope::All, None).await;

    let runtime = &core.instance(&id).unwrap().runtime;
    assert_eq!(runtime.status, Status::Stopped);
    assert!(runtime.preview.is_empty());
    assert_eq!(runtime.activity, Activity::Idle);
}

#[tokio::test]
async fn a_session_without_windows_counts_as_stopped() {
    let h = Harness::new();
    let mut core = h.core();
    let id = create(&mut core, "api").await;

    h.mux.empty_session(&session(&id));
    core.tick(TickScope::All, None).await;

    assert_eq!(core.instance(&id).unwrap().runtime.status, Status::Stopped);
}

#[tokio::test]
async fn dead_panes_keep_the_instance_running() {
    let h = Harness::new();
    let mut core = h.core();
    let id = create(&mut core, "api").await;
    h.mux.kill_pane(&session(&id), 0);

    core.tick(TickScope::All, None).await;

    assert!(core.instance(&id).unwrap().is_running());
    let view = core.view(Some(&id));
    let tabs = &view.selected().unwrap().tabs;
    assert_eq!(tabs.len(), 1);
    assert!(tabs[0].dead);
}

#[tokio::test]
async fn closed_windows_are_forgotten() {
    let h = Harness::new();
    let mut core = h.core();
    let id = create(&mut core, "api").await;
    let first = core.new_tab(&id, "", AgentKind::Terminal, None).await.unwrap();
    let second = core.new_tab(&id, "", AgentKind::Terminal, None).await.unwrap();
    assert_eq!((first, second), (1, 2));
    core.select_window(&id, first).unwrap();

    h.mux.drop_window(&session(&id), first);
    core.tick(TickScope::All, None).await;

    let inst = core.instance(&id).unwrap();
    let indexes: Vec<u32> = inst.followed_windows.iter().map(|w| w.index).collect();
    assert_eq!(indexes, vec![2]);
    assert_eq!(inst.runtime.selected_window, 0);

    let bar = h.mux.session(&session(&id)).unwrap().status.unwrap();
    assert_eq!(bar.windows, vec![(0, false), (2, false)]);

    let reopened = Store::new(h.root()).load_instances(None).unwrap();
    assert_eq!(reopened[0].followed_windows.len(), 1);
}

#[tokio::test]
async fn activity_follows_the_selected_window() {
    let h = Harness::new();
    let mut core = h.core();
    let id = create(&mut core, "api").await;
    let name = session(&id);

    h.mux.set_pane(&name, 0, "Reading files\n✻ Thinking… (esc to interrupt)");
    core.tick(TickScope::Selected, Some(&id)).await;
    assert_eq!(core.instance(&id).unwrap().runtime.activity, Activity::Busy);

    h.mux.set_pane(&name, 0, "Edit src/main.rs\nDo you want to make this edit?\n❯ 1. Yes");
    core.tick(TickScope::Selected, Some(&id)).await;
    let runtime = &core.instance(&id).unwrap().runtime;
    assert_eq!(runtime.activity, Activity::Waiting);
    assert_eq!(runtime.last_line, "❯ 1. Yes");

    h.mux.set_pane(&name, 0, "All tests pass.\n\n");
    core.tick(TickScope::Selected, Some(&id)).await;
    let runtime = &core.instance(&id).unwrap().runtime;
    assert_eq!(runtime.activity, Activity::Idle);
    assert_eq!(runtime.last_line, "All tests pass.");
}

#[tokio::test]
async fn selected_scope_touches_one_instance() {
    let h = Harness::new();
    let mut core = h.core();
    let a = create(&mut core, "a").await;
    let _b = create(&mut core, "b").await;
    h.mux.clear_calls();

    core.tick(TickScope::Selected, Some(&a)).await;

    assert_eq!(h.mux.count("list_sessions"), 1);
    assert_eq!(h.mux.count("list_windows"), 1);
    assert_eq!(h.mux.count("capture_pane"), 1);
    assert!(h.mux.calls().contains(&format!("list_windows {}", session(&a))));

    h.mux.clear_calls();
    core.tick(TickScope::All, None).await;
    assert_eq!(h.mux.count("list_sessions"), 1);
    assert_eq!(h.mux.count("list_windows"), 2);
}

#[tokio::test]
async fn listing_failures_keep_the_cached_state() {
    let h = Harness::new();
    let mut core = h.core();
    let id = create(&mut core, "api").await;
    h.mux.set_pane(&session(&id), 0, "hello");
    core.tick(TickScope::All, None).await;

    h.mux.fail("list_sessions", MuxError::Io("timed out".into()));
    core.tick(TickScope::All, None).await;
    assert!(core.instance(&id).unwrap().is_running());
    h.mux.heal("list_sessions");

    h.mux.fail("list_windows", MuxError::Io("server busy".into()));
    core.tick(TickScope::All, None).await;
    let runtime = &core.instance(&id).unwrap().runtime;
    assert!(runtime.status == Status::Running);
    assert_eq!(runtime.preview, "hello");
}

#[tokio::test]
async fn unclaimed_prefixed_sessions_are_orphans() {
    let h = Harness::new();
    let mut core = h.core();
    let id = create(&mut core, "api").await;
    h.mux.add_session("asmgr-ghost", "claude");
    h.mux.add_session("work", "vim");

    core.tick(TickScope::All, None).await;
    assert_eq!(core.orphans(), ["asmgr-ghost".to_string()]);
    assert_eq!(core.view(Some(&id)).orphans, vec!["asmgr-ghost".to_string()]);

    // Selected ticks leave the orphan list alone
    h.mux.drop_session("asmgr-ghost");
    core.tick(TickScope::Selected, Some(&id)).await;
    assert_eq!(core.orphans().len(), 1);
    core.tick(TickScope::All, None).await;
    assert!(core.orphans().is_empty());
}

#[tokio::test]
async fn sessions_of_other_projects_are_not_orphans() {
    let h = Harness::new();
    let mut core = h.core();
    let web = core.add_project("web").unwrap();
    core.switch_project(Some(&web.id)).unwrap();
    let other = create(&mut core, "frontend").await;
    core.switch_project(None).unwrap();

    core.tick(TickScope::All, None).await;
    assert!(core.orphans().is_empty());
    assert!(h.mux.session(&session(&other)).is_some());
}

#[tokio::test]
async fn a_stale_lock_is_taken_over_and_sessions_rediscovered() {
    let h = Harness::new();
    let id = {
        let mut core = h.core();
        create(&mut core, "api").await
    };
    // The previous process died without cleaning up
    let lock = h.root().join("default").join("project.lock");
    std::fs::write(&lock, "4194305\n").unwrap();
    h.mux.set_pane(&session(&id), 0, "still going");

    let mut core = h.core();
    assert_eq!(core.instance(&id).unwrap().runtime.status, Status::Stopped);
    assert_eq!(
        std::fs::read_to_string(&lock).unwrap().trim(),
        std::process::id().to_string()
    );

    core.tick(TickScope::All, None).await;
    let runtime = &core.instance(&id).unwrap().runtime;
    assert_eq!(runtime.status, Status::Running);
    assert_eq!(runtime.preview, "still going");
}

#[tokio::test]
async fn a_live_lock_refuses_a_second_core() {
    let h = Harness::new();
    let _core = h.core();

    let err = SessionCore::open(h.mux.clone(), h.config()).err().unwrap();
    assert!(matches!(err, CoreError::LockHeld(pid) if pid == std::process::id()));
}

#[tokio::test]
async fn quiesce_releases_the_lock() {
    let h = Harness::new();
    let mut core = h.core();
    core.quiesce().unwrap();

    assert!(!h.root().join("default").join("project.lock").exists());
    let reopened = SessionCore::open(h.mux.clone(), h.config());
    assert!(reopened.is_ok());
}
