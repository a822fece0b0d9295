/// Labels attached to per-turn metrics.
///
/// Only fixed-set values belong here. Channel and conversation ids are
/// caller-supplied and go on spans instead.
#[derive(Debug, Clone)]
pub struct TelemetryLabels {
    pub transport: String,
    pub extra: Vec<(String, String)>,
}

impl TelemetryLabels {
    pub fn new(transport: impl Into<String>) -> Self {
        Self {
            transport: transport.into(),
            extra: Vec::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra.push((key.into(), value.into()));
        self
    }

    pub fn tags(&self) -> Vec<(String, String)> {
        let mut tags = Vec::with_capacity(1 + self.extra.len());
        tags.push(("transport".into(), self.transport.clone()));
        for (key, value) in &self.extra {
            tags.push((key.clone(), value.clone()));
        }
        tags
    }
}
