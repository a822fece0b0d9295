use std::env;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TelemetryProtocol {
    Grpc,
    HttpProtobuf,
}

#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub endpoint: String,
    pub protocol: TelemetryProtocol,
    pub service_name: String,
    pub service_version: String,
    pub environment: String,
    pub json_logs: bool,
    pub enabled: bool,
}

impl TelemetryConfig {
    pub fn from_env(default_service_name: &str, default_service_version: &str) -> Self {
        Self::from_lookup(default_service_name, default_service_version, |key| {
            env::var(key).ok()
        })
    }

    pub fn from_lookup<F>(
        default_service_name: &str,
        default_service_version: &str,
        lookup: F,
    ) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let endpoint = lookup("OTEL_EXPORTER_OTLP_ENDPOINT").unwrap_or_default();
        let protocol = lookup("OTEL_EXPORTER_OTLP_PROTOCOL")
            .map(|v| match v.to_lowercase().as_str() {
                "http" | "http/protobuf" => TelemetryProtocol::HttpProtobuf,
                _ => TelemetryProtocol::Grpc,
            })
            .unwrap_or(TelemetryProtocol::Grpc);
        let service_name =
            lookup("OTEL_SERVICE_NAME").unwrap_or_else(|| default_service_name.to_string());
        let service_version = lookup("OTEL_SERVICE_VERSION")
            .unwrap_or_else(|| default_service_version.to_string());
        let environment = lookup("OTEL_RESOURCE_ATTRIBUTES")
            .and_then(parse_environment_from_resource)
            .or_else(|| lookup("DEPLOYMENT_ENV"))
            .unwrap_or_else(|| "dev".into());
        let json_logs = lookup("LOG_FORMAT")
            .map(|v| v.eq_ignore_ascii_case("json"))
            .unwrap_or(false);
        let enabled_flag = lookup("ENABLE_OTEL")
            .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
            .unwrap_or(false);
        let enabled = enabled_flag && !endpoint.trim().is_empty();

        Self {
            endpoint,
            protocol,
            service_name,
            service_version,
            environment,
            json_logs,
            enabled,
        }
    }

    pub fn exporter_enabled(&self) -> bool {
        self.enabled && !self.endpoint.trim().is_empty()
    }
}

fn parse_environment_from_resource(value: String) -> Option<String> {
    value.split(',').find_map(|kv| {
        let (key, val) = kv.split_once('=')?;
        (key.trim() == "deployment.environment").then(|| val.trim().to_string())
    })
}
