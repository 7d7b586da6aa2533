//! 编排器构建器：统一的组件初始化
//!
//! 未显式注入的组件按配置创建：LLM 后端、macOS 执行器、状态文件、偏好文件。测试注入脚本化 LLM 与记录型桌面。

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::actions::{StepDispatcher, Toolbox};
use crate::agents::AgentSet;
use crate::config::{AppConfig, RunMode};
use crate::core::{FileStatePublisher, Orchestrator, ProcessLauncher, ProcessRegistry, StatePublisher};
use crate::llm::{create_llm_from_config, LlmClient};
use crate::memory::{JsonFilePreferenceStore, NoopPreferenceStore, PreferenceStore};
use crate::planning::{ContextGatherer, DesktopContextGatherer, PlannerAdapter, PlannerSettings};

pub struct OrchestratorBuilder {
    config: AppConfig,
    llm: Option<Arc<dyn LlmClient>>,
    toolbox: Option<Toolbox>,
    gatherer: Option<Arc<dyn ContextGatherer>>,
    publisher: Option<Arc<dyn StatePublisher>>,
    preference_store: Option<Arc<dyn PreferenceStore>>,
    registry: ProcessRegistry,
    cancel: CancellationToken,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            llm: None,
            toolbox: None,
            gatherer: None,
            publisher: None,
            preference_store: None,
            registry: ProcessRegistry::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// 覆盖配置中的运行形态
    pub fn with_mode(mut self, mode: RunMode) -> Self {
        self.config.app.mode = mode;
        self
    }

    pub fn with_llm(mut self, llm: Arc<dyn LlmClient>) -> Self {
        self.llm = Some(llm);
        self
    }

    pub fn with_toolbox(mut self, toolbox: Toolbox) -> Self {
        self.toolbox = Some(toolbox);
        self
    }

    /// 默认用 toolbox 的 AppControl 采集环境
    pub fn with_gatherer(mut self, gatherer: Arc<dyn ContextGatherer>) -> Self {
        self.gatherer = Some(gatherer);
        self
    }

    pub fn with_publisher(mut self, publisher: Arc<dyn StatePublisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn with_preference_store(mut self, store: Arc<dyn PreferenceStore>) -> Self {
        self.preference_store = Some(store);
        self
    }

    /// 与自建执行器共享的进程登记表
    pub fn with_process_registry(mut self, registry: ProcessRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_cancel_token(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    fn build_preference_store(&self) -> Arc<dyn PreferenceStore> {
        let memory = &self.config.memory;
        if !memory.enabled {
            return Arc::new(NoopPreferenceStore);
        }
        let path = memory
            .preferences_file
            .clone()
            .unwrap_or_else(|| self.config.app.state_dir().join("preferences.json"));
        tracing::debug!(path = %path.display(), "preference store");
        Arc::new(JsonFilePreferenceStore::new(path))
    }

    pub fn build(self) -> Orchestrator {
        let preferences = self
            .preference_store
            .clone()
            .unwrap_or_else(|| self.build_preference_store());
        let launcher = ProcessLauncher::new(self.registry);
        let config = self.config;

        let toolbox = self
            .toolbox
            .unwrap_or_else(|| Toolbox::macos(&config, launcher.clone()));
        let llm = self.llm.unwrap_or_else(|| create_llm_from_config(&config));
        let gatherer = self
            .gatherer
            .unwrap_or_else(|| Arc::new(DesktopContextGatherer::new(toolbox.apps.clone())));
        let publisher = self
            .publisher
            .unwrap_or_else(|| Arc::new(FileStatePublisher::new(config.app.state_file())));

        let planner = PlannerAdapter::new(llm, PlannerSettings::from(&config.llm));
        let agents = AgentSet::from_toolbox(&toolbox, config.safety.step_pacing());
        let dispatcher = StepDispatcher::new(toolbox, config.safety.max_wait_secs);

        Orchestrator {
            config,
            planner,
            dispatcher,
            agents,
            gatherer,
            publisher,
            preferences,
            launcher,
            cancel: self.cancel,
        }
    }
}
