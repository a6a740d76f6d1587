use std::sync::Arc;

use async_trait::async_trait;

use cartwatch_core_types::WatchError;

use crate::model::{AcquireReport, AcquireRequest};
use crate::policy::AcquirePolicy;
use crate::ports::{CartProbe, NullProgress, PauseGate, ProductPage, ProgressSink, SkuTreeParser};
use crate::runner::{execute, RuntimeDeps};

/// Entry point of the acquisition engine.
#[async_trait]
pub trait Acquirer: Send + Sync {
    async fn add_all_skus(&self, req: AcquireRequest) -> Result<AcquireReport, WatchError>;
}

pub struct AcquirerBuilder {
    policy: AcquirePolicy,
    page: Option<Arc<dyn ProductPage>>,
    probe: Option<Arc<dyn CartProbe>>,
    tree: Option<Arc<dyn SkuTreeParser>>,
    pause: Option<Arc<dyn PauseGate>>,
    progress: Option<Arc<dyn ProgressSink>>,
}

impl AcquirerBuilder {
    pub fn new(policy: AcquirePolicy) -> Self {
        Self {
            policy,
            page: None,
            probe: None,
            tree: None,
            pause: None,
            progress: None,
        }
    }

    pub fn with_page(mut self, port: Arc<dyn ProductPage>) -> Self {
        self.page = Some(port);
        self
    }

    pub fn with_probe(mut self, port: Arc<dyn CartProbe>) -> Self {
        self.probe = Some(port);
        self
    }

    pub fn with_tree(mut self, port: Arc<dyn SkuTreeParser>) -> Self {
        self.tree = Some(port);
        self
    }

    pub fn with_pause(mut self, port: Arc<dyn PauseGate>) -> Self {
        self.pause = Some(port);
        self
    }

    pub fn with_progress(mut self, port: Arc<dyn ProgressSink>) -> Self {
        self.progress = Some(port);
        self
    }

    pub fn build(self) -> Arc<dyn Acquirer> {
        Arc::new(AcquirerImpl {
            policy: self.policy,
            page: self.page.expect("product page port is required"),
            probe: self.probe.expect("cart probe port is required"),
            tree: self.tree.expect("sku tree port is required"),
            pause: self.pause.expect("pause gate is required"),
            progress: self.progress.unwrap_or_else(|| Arc::new(NullProgress)),
        })
    }
}

struct AcquirerImpl {
    policy: AcquirePolicy,
    page: Arc<dyn ProductPage>,
    probe: Arc<dyn CartProbe>,
    tree: Arc<dyn SkuTreeParser>,
    pause: Arc<dyn PauseGate>,
    progress: Arc<dyn ProgressSink>,
}

#[async_trait]
impl Acquirer for AcquirerImpl {
    async fn add_all_skus(&self, req: AcquireRequest) -> Result<AcquireReport, WatchError> {
        let deps = RuntimeDeps {
            page: self.page.as_ref(),
            probe: self.probe.as_ref(),
            tree: self.tree.as_ref(),
            pause: self.pause.as_ref(),
            progress: self.progress.as_ref(),
            policy: &self.policy,
        };
        execute(&req, deps).await
    }
}
