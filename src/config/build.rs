//! Realisation of [`HandlerConfig`] through the handler builders.

use std::sync::Arc;
use std::time::Duration;

use super::{ConfigError, HandlerConfig, HandlerKind};
use crate::handler::FemtoHandlerTrait;
use crate::handlers::{HandlerBuilderTrait, NetworkHandlerBuilder, StreamHandlerBuilder};
use crate::lifecycle::ExitHooks;
use crate::network::{Framing, LogstashVersion, PayloadType};

impl HandlerConfig {
    /// Build the handler named `id`. Network handlers are started and their
    /// exit stop is registered with `hooks`.
    pub fn build(&self, id: &str, hooks: &Arc<ExitHooks>) -> Result<Arc<dyn FemtoHandlerTrait>, ConfigError> {
        let built = match self.kind {
            HandlerKind::Stream => self.stream_builder(id)?.build(),
            _ => self.network_builder(id, hooks)?.build(),
        };
        built.map_err(|source| ConfigError::HandlerBuild {
            id: id.to_owned(),
            source,
        })
    }

    fn stream_builder(&self, id: &str) -> Result<StreamHandlerBuilder, ConfigError> {
        let mut builder = match self.target.as_deref().map(str::trim) {
            None | Some("stderr") => StreamHandlerBuilder::stderr(),
            Some("stdout") => StreamHandlerBuilder::stdout(),
            Some(other) => return Err(invalid(id, "target", other)),
        };
        builder = builder.with_level(self.effective_level());
        if let Some(format) = &self.format {
            builder = builder.with_format(format.clone());
        }
        if let Some(datefmt) = &self.datefmt {
            builder = builder.with_datefmt(datefmt.clone());
        }
        Ok(builder)
    }

    fn network_builder(&self, id: &str, hooks: &Arc<ExitHooks>) -> Result<NetworkHandlerBuilder, ConfigError> {
        let mut builder = match self.kind {
            HandlerKind::Fluent => NetworkHandlerBuilder::fluent(),
            HandlerKind::Logstash => NetworkHandlerBuilder::logstash(),
            HandlerKind::LogstashUdp => NetworkHandlerBuilder::logstash_udp(),
            HandlerKind::Push | HandlerKind::Stream => NetworkHandlerBuilder::push(),
        }
        .with_level(self.effective_level())
        .with_exit_hooks(Arc::clone(hooks));

        if let Some(host) = &self.host {
            builder = builder.with_host(host.clone());
        }
        if let Some(port) = self.port {
            builder = builder.with_port(port);
        }
        if let Some(path) = &self.path {
            builder = builder.with_unix_path(path.clone());
        }
        if let Some(tls) = &self.tls {
            builder = builder.with_tls(tls.domain.clone(), tls.insecure_skip_verify);
        }
        if let Some(seconds) = self.timeout_seconds {
            builder = builder.with_timeout(seconds_to_duration(id, "timeout_seconds", seconds)?);
        }
        if let Some(linger) = self.linger_seconds {
            builder = builder.with_linger(seconds_to_duration(id, "linger_seconds", linger)?);
        }
        if let Some(bytes) = self.buffer_max_bytes {
            builder = builder.with_buffer_max_bytes(bytes);
        }
        if let Some(messages) = self.high_water_mark {
            builder = builder.with_high_water_mark(messages);
        }
        if let Some(tag) = &self.tag {
            builder = builder.with_tag(tag.clone());
        }
        if let Some(payload) = &self.payload_type {
            let payload: PayloadType = payload
                .parse()
                .map_err(|_| invalid(id, "payload_type", payload))?;
            builder = builder.with_payload_type(payload);
        }
        if let Some(version) = self.version {
            let version = LogstashVersion::try_from(version)
                .map_err(|_| invalid(id, "version", &version.to_string()))?;
            builder = builder.with_version(version);
        }
        if let Some(message_type) = &self.message_type {
            builder = builder.with_message_type(message_type.clone());
        }
        if let Some(framing) = &self.framing {
            builder = builder.with_framing(parse_framing(id, framing)?);
        }
        Ok(builder)
    }
}

fn parse_framing(id: &str, value: &str) -> Result<Framing, ConfigError> {
    match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "length_prefixed" | "length" => Ok(Framing::LengthPrefixed),
        "none" => Ok(Framing::None),
        _ => Err(invalid(id, "framing", value)),
    }
}

fn seconds_to_duration(id: &str, key: &str, seconds: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(seconds).map_err(|_| invalid(id, key, &seconds.to_string()))
}

fn invalid(id: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: id.to_owned(),
        key: key.to_owned(),
        value: value.to_owned(),
    }
}
