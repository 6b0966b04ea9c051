use serde::Deserialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::future::Future;
use std::path::Path;

use super::graph::{Chapter, NextChapter, Story, StoryState};
use crate::error::DefinitionError;

/// 故事定义文件（JSON）
///
/// ```json
/// {
///   "id": "museum",
///   "initialState": { "currentChapter": "intro" },
///   "chapters": {
///     "intro": { "title": "入口", "track": "audio/intro.mp3", "nextChapter": "hall" },
///     "hall":  { "nextChapter": { "branch": { "key": "route", "cases": { "east": "east-wing" }, "default": "exit" } } },
///     "east-wing": { "nextChapter": { "resolver": "after-east" } },
///     "exit":  { "nextChapter": null }
///   }
/// }
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryDefinition {
    pub id: String,
    pub initial_state: StoryState,
    pub chapters: BTreeMap<String, ChapterDefinition>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterDefinition {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub track: Option<String>,
    /// 缺省等同于 null（终章）
    #[serde(default)]
    pub next_chapter: Value,
}

/// 按名字注册的代码解析器，定义文件里用 `{"resolver": "<name>"}` 引用
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    resolvers: HashMap<String, NextChapter>,
}

impl ResolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_sync<F>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(&StoryState) -> String + Send + Sync + 'static,
    {
        self.resolvers
            .insert(name.into(), NextChapter::resolve_with(f));
        self
    }

    pub fn register_async<F, Fut>(&mut self, name: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(StoryState) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = String> + Send + 'static,
    {
        self.resolvers
            .insert(name.into(), NextChapter::resolve_async(f));
        self
    }

    fn get(&self, name: &str) -> Option<NextChapter> {
        self.resolvers.get(name).cloned()
    }
}

/// 数据驱动的分支：读取 `state[key]`，按 cases 映射到章节。
///
/// 未命中时走 default；没有 default 时把状态值本身当作章节 id。
#[derive(Debug, Clone, Deserialize)]
struct Branch {
    key: String,
    #[serde(default)]
    cases: BTreeMap<String, String>,
    #[serde(default)]
    default: Option<String>,
}

impl Branch {
    fn pick(&self, state: &StoryState) -> String {
        let value = match state.get(&self.key) {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Null) | None => None,
            Some(other) => Some(other.to_string()),
        };
        if let Some(id) = value.as_ref().and_then(|v| self.cases.get(v)) {
            return id.clone();
        }
        self.default.clone().or(value).unwrap_or_default()
    }
}

impl StoryDefinition {
    pub fn from_json(bytes: &[u8]) -> Result<Self, DefinitionError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn load(path: &Path) -> Result<Self, DefinitionError> {
        let bytes = fs::read(path)?;
        Self::from_json(&bytes)
    }

    pub fn into_story(self, registry: &ResolverRegistry) -> Result<Story, DefinitionError> {
        let mut story = Story::new(self.id, self.initial_state);
        for (id, def) in self.chapters {
            let mut chapter = Chapter::new(parse_next_chapter(&id, def.next_chapter, registry));
            if let Some(title) = def.title {
                chapter = chapter.titled(title);
            }
            if let Some(track) = def.track {
                chapter = chapter.with_track(track);
            }
            story = story.with_chapter(id, chapter);
        }
        story.validate()?;
        Ok(story)
    }
}

fn parse_next_chapter(chapter: &str, value: Value, registry: &ResolverRegistry) -> NextChapter {
    let map = match value {
        Value::Null => return NextChapter::End,
        Value::String(id) => return NextChapter::Fixed(id),
        Value::Object(map) if map.len() == 1 => map,
        other => return NextChapter::Unrecognized(other),
    };

    if let Some(Value::String(name)) = map.get("resolver") {
        if let Some(next) = registry.get(name) {
            return next;
        }
        tracing::warn!(chapter, resolver = %name, "未注册的解析器");
    } else if let Some(branch) = map.get("branch") {
        match serde_json::from_value::<Branch>(branch.clone()) {
            Ok(branch) => return NextChapter::resolve_with(move |state| branch.pick(state)),
            Err(e) => tracing::warn!(chapter, err = %e, "branch 定义格式错误"),
        }
    }
    NextChapter::Unrecognized(Value::Object(map))
}
