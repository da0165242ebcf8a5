//! Tunable timeouts and intervals (spec §4.9), loaded once at startup from `/config/config.xml`
//! (spec §6.2) through a host-provided reader. Unknown tags/properties warn and are ignored;
//! an absent file uses defaults.

use flux::logging::LogLevel;
use quick_xml::events::Event;
use quick_xml::Reader;
use std::io::BufRead;

const MIN_INTERVAL: f32 = 0.01;

#[derive(Debug, Clone, Copy)]
pub struct Configuration {
    pub connect_resend_interval: f32,
    pub connect_timeout: f32,
    /// Loaded and clamped for completeness; the reliable retransmit cadence is driven solely by
    /// `reliable_timeout` (`Connection::retransmit_timed_out`), not by a separate resend clock.
    pub reliable_resend_interval: f32,
    pub reliable_timeout: f32,
    pub log_level: LogLevel,
    /// Additive tunable (spec §9 open question on the unenforced retry limit): number of
    /// unacknowledged retransmits of the same reliable message before the Connection is
    /// terminated. `0` means retry indefinitely.
    pub max_reliable_retries: u32,
    pub window_size: u16,
}

impl Default for Configuration {
    fn default() -> Configuration {
        Configuration {
            connect_resend_interval: 1.0,
            connect_timeout: 5.0,
            reliable_resend_interval: 0.5,
            reliable_timeout: 3.0,
            log_level: LogLevel::Warning,
            max_reliable_retries: 0,
            window_size: 10,
        }
    }
}

impl Configuration {
    /// Parses the `<config><property name="...">value</property>...</config>` document. Unknown
    /// property names are logged through `log` and otherwise ignored; every interval is clamped
    /// to the 0.01s floor after parsing.
    pub fn load(source: impl BufRead) -> Configuration {
        let mut config = Configuration::default();
        let mut reader = Reader::from_reader(source);
        reader.config_mut().trim_text(true);

        let mut buf = Vec::new();
        let mut current_property: Option<String> = None;

        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Start(tag)) if tag.name().as_ref() == b"property" => {
                    current_property = tag
                        .attributes()
                        .flatten()
                        .find(|attr| attr.key.as_ref() == b"name")
                        .and_then(|attr| attr.unescape_value().ok().map(|v| v.into_owned()));
                }
                Ok(Event::Text(text)) => {
                    if let Some(name) = current_property.as_deref() {
                        let value = text.decode().unwrap_or_default();
                        config.apply(name, value.trim());
                    }
                }
                Ok(Event::End(tag)) if tag.name().as_ref() == b"property" => {
                    current_property = None;
                }
                Ok(Event::Eof) => break,
                Ok(_) => {}
                Err(err) => {
                    log::warn!("config.xml parse error, falling back to remaining defaults: {}", err);
                    break;
                }
            }
            buf.clear();
        }

        config.clamp();
        config
    }

    fn apply(&mut self, name: &str, value: &str) {
        match name {
            "logLevel" => {
                self.log_level = match value {
                    "error" => LogLevel::Error,
                    "warning" => LogLevel::Warning,
                    "info" => LogLevel::Info,
                    "debug" => LogLevel::Debug,
                    other => {
                        log::warn!("unknown logLevel '{}', keeping previous value", other);
                        self.log_level
                    }
                };
            }
            "connectResendInterval" => self.connect_resend_interval = parse_or_warn(name, value, self.connect_resend_interval),
            "connectTimeout" => self.connect_timeout = parse_or_warn(name, value, self.connect_timeout),
            "reliableResendInterval" => self.reliable_resend_interval = parse_or_warn(name, value, self.reliable_resend_interval),
            "reliableTimeout" => self.reliable_timeout = parse_or_warn(name, value, self.reliable_timeout),
            "maxReliableRetries" => {
                self.max_reliable_retries = value.parse().unwrap_or_else(|_| {
                    log::warn!("invalid maxReliableRetries '{}', keeping previous value", value);
                    self.max_reliable_retries
                });
            }
            other => log::warn!("unknown config property '{}', ignored", other),
        }
    }

    fn clamp(&mut self) {
        self.connect_resend_interval = self.connect_resend_interval.max(MIN_INTERVAL);
        self.connect_timeout = self.connect_timeout.max(MIN_INTERVAL);
        self.reliable_resend_interval = self.reliable_resend_interval.max(MIN_INTERVAL);
        self.reliable_timeout = self.reliable_timeout.max(MIN_INTERVAL);
    }
}

fn parse_or_warn(name: &str, value: &str, previous: f32) -> f32 {
    value.parse().unwrap_or_else(|_| {
        log::warn!("invalid value '{}' for '{}', keeping previous value", value, name);
        previous
    })
}
