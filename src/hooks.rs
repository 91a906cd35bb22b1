use crate::models::MetricRow;
use async_trait::async_trait;
use std::sync::Arc;

/// Receives every validated metrics batch after it has been stored.
#[async_trait]
pub trait MetricsListener: Send + Sync {
    async fn after_metrics_fetch(&self, rows: &[MetricRow]);
}

/// Produces at most one admin-facing message per render.
pub trait NoticeRenderer: Send + Sync {
    fn render_notice(&self) -> Option<String>;
}

/// A unit that wires its own hooks at startup.
pub trait Component: Send + Sync {
    fn name(&self) -> &'static str;
    fn register(self: Arc<Self>, registry: &mut HookRegistry);
}

#[derive(Default)]
pub struct HookRegistry {
    components: Vec<&'static str>,
    listeners: Vec<Arc<dyn MetricsListener>>,
    renderers: Vec<Arc<dyn NoticeRenderer>>,
}

impl HookRegistry {
    /// Registers each component in list order.
    pub fn from_components(components: Vec<Arc<dyn Component>>) -> Self {
        let mut registry = Self::default();
        for component in components {
            let name = component.name();
            component.register(&mut registry);
            registry.components.push(name);
            tracing::debug!(component = name, "component registered");
        }
        registry
    }

    pub fn add_metrics_listener(&mut self, listener: Arc<dyn MetricsListener>) {
        self.listeners.push(listener);
    }

    pub fn add_notice_renderer(&mut self, renderer: Arc<dyn NoticeRenderer>) {
        self.renderers.push(renderer);
    }

    pub fn component_names(&self) -> &[&'static str] {
        &self.components
    }

    pub fn metrics_listeners(&self) -> Vec<Arc<dyn MetricsListener>> {
        self.listeners.clone()
    }

    pub fn render_notices(&self) -> Vec<String> {
        self.renderers
            .iter()
            .filter_map(|renderer| renderer.render_notice())
            .collect()
    }
}
