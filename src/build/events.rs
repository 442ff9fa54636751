use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildTrigger {
    Full,
    Page,
    Assets,
    Clean,
}

impl BuildTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Page => "page",
            Self::Assets => "assets",
            Self::Clean => "clean",
        }
    }
}

/// 构建进度事件（通过广播通道推送给订阅者）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum BuildEvent {
    Started {
        build_id: String,
        trigger: BuildTrigger,
    },
    StageBegin {
        stage: &'static str,
    },
    StageEnd {
        stage: &'static str,
        elapsed_ms: u64,
    },
    Finished {
        build_id: String,
        total_ms: u64,
        pages_built: usize,
        pages_skipped: usize,
        assets_built: usize,
        feeds_built: usize,
    },
    Failed {
        build_id: String,
        error: String,
    },
}
