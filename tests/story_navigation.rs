/// 章节导航：结束、解析器、非法跳转、持久化恢复与重置。
use serde_json::{Value, json};
use std::sync::Arc;
use tour_player::error::StoryError;
use tour_player::storage::{JsonFileStore, KeyValueStore, MemoryStore};
use tour_player::story::{
    Chapter, NextChapter, ResolverRegistry, StateUpdate, Story, StoryController, StoryDefinition,
    StoryEvent, StoryState,
};

fn museum() -> Story {
    Story::new("museum", StoryState::new("intro").with("route", json!("east")))
        .with_chapter("intro", Chapter::new(NextChapter::fixed("hall")).titled("入口"))
        .with_chapter(
            "hall",
            Chapter::new(NextChapter::resolve_with(|state| {
                match state.get("route").and_then(Value::as_str) {
                    Some("east") => "east-wing".to_owned(),
                    _ => "exit".to_owned(),
                }
            })),
        )
        .with_chapter(
            "east-wing",
            Chapter::new(NextChapter::resolve_async(|_state| async { "intro".to_owned() })),
        )
        .with_chapter("broken", Chapter::new(NextChapter::Unrecognized(json!(42))))
        .with_chapter("exit", Chapter::new(NextChapter::End))
}

#[tokio::test]
async fn test_walk_through_fixed_sync_and_async_transitions() {
    let ctl = StoryController::new(museum(), Arc::new(MemoryStore::new())).expect("controller");
    let mut events = ctl.subscribe_events();

    ctl.next_chapter().await.expect("intro -> hall");
    assert_eq!(ctl.current_chapter(), "hall");
    ctl.next_chapter().await.expect("hall -> east-wing");
    assert_eq!(ctl.current_chapter(), "east-wing");
    ctl.next_chapter().await.expect("east-wing -> intro");
    assert_eq!(ctl.current_chapter(), "intro");

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    assert_eq!(
        seen,
        vec![
            StoryEvent::ChapterChanged { from: "intro".into(), to: "hall".into() },
            StoryEvent::ChapterChanged { from: "hall".into(), to: "east-wing".into() },
            StoryEvent::ChapterChanged { from: "east-wing".into(), to: "intro".into() },
        ]
    );
}

#[tokio::test]
async fn test_terminal_chapter_emits_end_and_keeps_state() {
    let store = Arc::new(MemoryStore::new());
    let ctl = StoryController::new(museum(), store.clone()).expect("controller");
    ctl.set_chapter("exit").await.expect("goto exit");
    let before = ctl.state();
    let mut events = ctl.subscribe_events();

    ctl.next_chapter().await.expect("end");

    assert_eq!(
        events.try_recv().expect("event"),
        StoryEvent::Ended { chapter: "exit".into() }
    );
    assert!(events.try_recv().is_err());
    assert_eq!(ctl.state(), before);
}

#[tokio::test]
async fn test_unrecognized_transition_is_an_error() {
    let ctl = StoryController::new(museum(), Arc::new(MemoryStore::new())).expect("controller");
    ctl.set_chapter("broken").await.expect("goto broken");

    let err = ctl.next_chapter().await.unwrap_err();
    assert!(matches!(err, StoryError::InvalidTransition { ref chapter, .. } if chapter == "broken"));
    assert_eq!(ctl.current_chapter(), "broken");
}

#[tokio::test]
async fn test_resolver_to_unknown_chapter_fails() {
    let story = Story::new("lost", StoryState::new("start")).with_chapter(
        "start",
        Chapter::new(NextChapter::resolve_with(|_| "nowhere".to_owned())),
    );
    let ctl = StoryController::new(story, Arc::new(MemoryStore::new())).expect("controller");
    let err = ctl.next_chapter().await.unwrap_err();
    assert!(matches!(err, StoryError::UnknownChapter(id) if id == "nowhere"));
    assert_eq!(ctl.current_chapter(), "start");
}

#[tokio::test]
async fn test_progress_survives_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    {
        let store = Arc::new(JsonFileStore::open(dir.path()).expect("open"));
        let ctl = StoryController::new(museum(), store).expect("controller");
        ctl.next_chapter().await.expect("next");
        let Value::Object(partial) = json!({"route": "west", "visited": true}) else {
            unreachable!()
        };
        ctl.update_state(StateUpdate::Merge(partial)).await.expect("merge");
    }

    let store = Arc::new(JsonFileStore::open(dir.path()).expect("reopen"));
    let ctl = StoryController::new(museum(), store).expect("controller");
    let state = ctl.state();
    assert_eq!(state.current_chapter, "hall");
    assert_eq!(state.get("route"), Some(&json!("west")));
    assert_eq!(state.get("visited"), Some(&json!(true)));

    // route 已改为 west
    ctl.next_chapter().await.expect("next");
    assert_eq!(ctl.current_chapter(), "exit");
}

#[tokio::test]
async fn test_apply_update_sees_latest_persisted_state() {
    let store = Arc::new(MemoryStore::new());
    let ctl = StoryController::new(museum(), store.clone()).expect("controller");
    store
        .set("story-museum-state", json!({"currentChapter": "hall", "visits": 2}))
        .expect("external write");

    ctl.update_state(StateUpdate::apply(|state| {
        let visits = state.get("visits").and_then(Value::as_i64).unwrap_or(0);
        state.with("visits", json!(visits + 1))
    }))
    .await
    .expect("apply");

    assert_eq!(ctl.current_chapter(), "hall");
    assert_eq!(ctl.state().get("visits"), Some(&json!(3)));
}

#[tokio::test]
async fn test_reset_clears_namespace_only() {
    let store = Arc::new(MemoryStore::new());
    store.set("progress-hall", json!(12.5)).expect("seed");
    store.set("story-garden-state", json!({"currentChapter": "gate"})).expect("seed");

    let ctl = StoryController::new(museum(), store.clone()).expect("controller");
    ctl.set_chapter("exit").await.expect("goto");
    let mut events = ctl.subscribe_events();
    let mut states = ctl.subscribe_state();

    ctl.reset_story().await.expect("reset");

    assert_eq!(events.try_recv().expect("event"), StoryEvent::Reset);
    assert!(states.has_changed().expect("state channel"));
    assert_eq!(ctl.state(), *ctl.story().initial_state());
    assert_eq!(store.get("progress-hall").expect("get"), Some(json!(12.5)));
    assert!(store.get("story-garden-state").expect("get").is_some());
    assert_eq!(
        store.get("story-museum-state").expect("get"),
        Some(json!({"currentChapter": "intro", "route": "east"}))
    );
}

#[tokio::test]
async fn test_invalid_story_is_rejected() {
    let story = Story::new("bad", StoryState::new("intro"))
        .with_chapter("intro", Chapter::new(NextChapter::fixed("missing")));
    let err = StoryController::new(story, Arc::new(MemoryStore::new())).err();
    assert!(matches!(err, Some(StoryError::UnknownChapter(id)) if id == "missing"));
}

#[tokio::test]
async fn test_definition_file_with_registered_resolver() {
    let json = r#"{
        "id": "garden",
        "initialState": { "currentChapter": "gate" },
        "chapters": {
            "gate": { "title": "大门", "track": "audio/gate.mp3", "nextChapter": { "resolver": "by-season" } },
            "spring": { "nextChapter": null },
            "winter": {}
        }
    }"#;
    let mut registry = ResolverRegistry::new();
    registry.register_async("by-season", |state: StoryState| async move {
        match state.get("season").and_then(Value::as_str) {
            Some("winter") => "winter".to_owned(),
            _ => "spring".to_owned(),
        }
    });
    let story = StoryDefinition::from_json(json.as_bytes())
        .expect("parse")
        .into_story(&registry)
        .expect("story");
    assert_eq!(story.chapter("gate").and_then(|c| c.track.as_deref()), Some("audio/gate.mp3"));

    let ctl = StoryController::new(story, Arc::new(MemoryStore::new())).expect("controller");
    let Value::Object(partial) = json!({"season": "winter"}) else {
        unreachable!()
    };
    ctl.update_state(StateUpdate::Merge(partial)).await.expect("merge");
    ctl.next_chapter().await.expect("next");
    assert_eq!(ctl.current_chapter(), "winter");
}
