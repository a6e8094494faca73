//! INI front end for [`PipelineConfig`].
//!
//! Parsing is delegated to `rust-ini`; this module maps sections onto the
//! configuration structs and decodes files through `encoding_rs`.

use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use encoding_rs::Encoding;
use ini::{Ini, Properties};

use super::{ConfigError, HandlerConfig, PipelineConfig, TlsConfig};
use crate::level::FemtoLevel;

const HANDLER_PREFIX: &str = "handler:";

pub(super) fn read_file(path: &Path, label: Option<&str>) -> Result<String, ConfigError> {
    let shown = path.display().to_string();
    let bytes = fs::read(path).map_err(|source| ConfigError::Io {
        path: shown.clone(),
        source,
    })?;
    if bytes.is_empty() {
        return Err(ConfigError::EmptyFile(shown));
    }
    decode(&shown, &bytes, label.unwrap_or("utf-8"))
}

fn decode(path: &str, bytes: &[u8], label: &str) -> Result<String, ConfigError> {
    let encoding = Encoding::for_label(label.trim().as_bytes())
        .ok_or_else(|| ConfigError::UnknownEncoding(label.to_owned()))?;
    let (decoded, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        return Err(ConfigError::Decode {
            path: path.to_owned(),
            encoding: encoding.name(),
        });
    }
    Ok(decoded.into_owned())
}

pub(super) fn parse_str(text: &str) -> Result<PipelineConfig, ConfigError> {
    let ini = Ini::load_from_str(text).map_err(|err| ConfigError::Ini(err.to_string()))?;
    let mut config = PipelineConfig::default();
    for (section, props) in ini.iter() {
        match section {
            None if props.iter().next().is_none() => {}
            None => return Err(ConfigError::UnknownSection("DEFAULT".into())),
            Some("deferred") => apply_deferred(&mut config, props)?,
            Some("console") => config.console = Some(handler_section("console", None, props)?),
            Some("levels") => {
                for (logger, level) in props.iter() {
                    config
                        .granular_levels
                        .insert(logger.to_owned(), FemtoLevel::from_config(Some(level)));
                }
            }
            Some(name) => match name.strip_prefix(HANDLER_PREFIX) {
                Some(label) if !label.trim().is_empty() => config.handlers.push(handler_section(
                    name,
                    Some(label.trim()),
                    props,
                )?),
                _ => return Err(ConfigError::UnknownSection(name.to_owned())),
            },
        }
    }
    Ok(config)
}

fn apply_deferred(config: &mut PipelineConfig, props: &Properties) -> Result<(), ConfigError> {
    for (key, value) in props.iter() {
        match key {
            "max_size" => config.deferred_max_size = parse_value("deferred", key, value)?,
            _ => return Err(unknown_key("deferred", key)),
        }
    }
    Ok(())
}

fn handler_section(
    section: &str,
    name: Option<&str>,
    props: &Properties,
) -> Result<HandlerConfig, ConfigError> {
    let mut handler = HandlerConfig {
        name: name.map(str::to_owned),
        ..HandlerConfig::default()
    };
    let mut tls_enabled = None;
    let mut tls = TlsConfig::default();
    for (key, value) in props.iter() {
        let text = || Some(value.to_owned());
        match key {
            "kind" => {
                handler.kind = value
                    .parse()
                    .map_err(|_| invalid_value(section, key, value))?;
            }
            "level" => handler.level = Some(FemtoLevel::from_config(Some(value))),
            "format" => handler.format = text(),
            "datefmt" => handler.datefmt = text(),
            "target" => handler.target = text(),
            "host" => handler.host = text(),
            "port" => handler.port = Some(parse_value(section, key, value)?),
            "path" => handler.path = Some(PathBuf::from(value)),
            "timeout_seconds" => handler.timeout_seconds = Some(parse_value(section, key, value)?),
            "buffer_max_bytes" => handler.buffer_max_bytes = Some(parse_value(section, key, value)?),
            "high_water_mark" => handler.high_water_mark = Some(parse_value(section, key, value)?),
            "linger_seconds" => handler.linger_seconds = Some(parse_value(section, key, value)?),
            "tag" => handler.tag = text(),
            "payload_type" => handler.payload_type = text(),
            "version" => handler.version = Some(parse_value(section, key, value)?),
            "message_type" => handler.message_type = text(),
            "framing" => handler.framing = text(),
            "tls" => tls_enabled = Some(parse_bool(section, key, value)?),
            "tls_domain" => tls.domain = text(),
            "tls_insecure_skip_verify" => tls.insecure_skip_verify = parse_bool(section, key, value)?,
            _ => return Err(unknown_key(section, key)),
        }
    }
    let tls_configured = tls != TlsConfig::default();
    handler.tls = match tls_enabled {
        Some(false) => None,
        Some(true) => Some(tls),
        None if tls_configured => Some(tls),
        None => None,
    };
    Ok(handler)
}

fn parse_value<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid_value(section, key, value))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid_value(section, key, value)),
    }
}

fn invalid_value(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_owned(),
        key: key.to_owned(),
        value: value.to_owned(),
    }
}

fn unknown_key(section: &str, key: &str) -> ConfigError {
    ConfigError::UnknownKey {
        section: section.to_owned(),
        key: key.to_owned(),
    }
}
