//! 릴레이 설정 -- config.json 파싱 및 유효성 검증
//!
//! [`RelayConfig`]는 프로세스 수명 동안 불변인 전체 설정을 담습니다.
//! 서버가 연결을 수락하기 전에 `validate()`가 모든 규칙의 정규식을
//! 컴파일해 보므로, 잘못된 설정은 시작 시점에만 실패합니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`LOGHOOK_SERVER_PORT=601` 형식)
//! 3. 설정 파일 (`config.json`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), loghook::RelayError> {
//! use loghook::config::RelayConfig;
//!
//! let config = RelayConfig::load("/config/config.json").await?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::error::RelayError;

/// 릴레이 통합 설정
///
/// `config.json` 파일의 최상위 구조를 나타냅니다.
/// 로드 이후에는 읽기 전용으로만 공유됩니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RelayConfig {
    /// TCP 리스너 설정
    #[serde(default)]
    pub server: ServerConfig,
    /// 로깅 설정
    #[serde(default)]
    pub log: LogConfig,
    /// 디스패처 설정
    #[serde(default)]
    pub dispatch: DispatchConfig,
    /// 테스트 모드 -- 모든 프레임에 대해 test_webhook을 무조건 호출
    #[serde(default)]
    pub test_mode: bool,
    /// 테스트 모드에서 호출할 webhook (test_mode가 false면 무시)
    #[serde(default)]
    pub test_webhook: Option<WebhookTarget>,
    /// 순서가 유지되는 매칭 규칙 목록
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

/// TCP 리스너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 리슨 주소
    #[serde(default = "default_host")]
    pub host: String,
    /// 리슨 포트
    #[serde(default = "default_port")]
    pub port: u16,
    /// 최대 동시 연결 수
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

/// 로깅 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 로그 형식 (json, pretty)
    #[serde(default = "default_log_format")]
    pub format: String,
}

/// Webhook 디스패처 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// 전송 시도당 타임아웃 (초)
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 유한 디스패치 큐 용량 (초과분은 drop-newest)
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// 전송 워커 수
    #[serde(default = "default_workers")]
    pub workers: usize,
}

/// Webhook 대상
///
/// `url`은 POST 대상 엔드포인트, `title`과 `url_field`는
/// 페이로드에 그대로 실리는 값입니다.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookTarget {
    /// POST 대상 엔드포인트 URL
    pub url: String,
    /// 페이로드 `title` 필드 값
    #[serde(default)]
    pub title: String,
    /// 페이로드 `url` 필드 값 (빈 문자열 허용)
    #[serde(default)]
    pub url_field: String,
}

/// 매칭 규칙 설정
///
/// `regex`는 대소문자 구분 없이, 앵커 없이 텍스트 내 어디서든 매칭됩니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// 규칙 이름 (진단용, 중복 불가)
    pub name: String,
    /// 매칭 패턴
    pub regex: String,
    /// 매칭 시 호출할 webhook
    pub webhook: WebhookTarget,
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_port() -> u16 {
    12080
}

fn default_max_connections() -> usize {
    256
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_format() -> String {
    "pretty".to_owned()
}

fn default_timeout_secs() -> u64 {
    5
}

fn default_queue_capacity() -> usize {
    1024
}

fn default_workers() -> usize {
    4
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_connections: default_max_connections(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            queue_capacity: default_queue_capacity(),
            workers: default_workers(),
        }
    }
}

impl ServerConfig {
    /// `host:port` 형식의 바인드 주소를 반환합니다.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl RelayConfig {
    /// JSON 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// JSON 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RelayError::Config {
                    field: "config".to_owned(),
                    reason: format!("file not found: {}", path.display()),
                }
            } else {
                RelayError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// JSON 문자열에서 설정을 파싱합니다.
    pub fn parse(json_str: &str) -> Result<Self, RelayError> {
        serde_json::from_str(json_str).map_err(|e| RelayError::Config {
            field: "config".to_owned(),
            reason: format!("JSON parse error: {e}"),
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 네이밍 규칙: `LOGHOOK_{SECTION}_{FIELD}`
    /// 예: `LOGHOOK_SERVER_PORT=601`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(host) = std::env::var("LOGHOOK_SERVER_HOST")
            && !host.is_empty()
        {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("LOGHOOK_SERVER_PORT")
            && let Ok(port) = port.parse()
        {
            self.server.port = port;
        }
        if let Ok(test_mode) = std::env::var("LOGHOOK_TEST_MODE")
            && let Ok(test_mode) = test_mode.parse()
        {
            self.test_mode = test_mode;
        }
        if let Ok(level) = std::env::var("LOGHOOK_LOG_LEVEL")
            && !level.is_empty()
        {
            self.log.level = level;
        }
    }

    /// 설정값의 유효성을 검증합니다.
    ///
    /// 규칙 이름의 중복/공백, 정규식 컴파일 가능 여부, webhook URL 유무를
    /// 확인합니다. 여기서 통과한 설정은 서버 시작 이후 실패하지 않습니다.
    pub fn validate(&self) -> Result<(), RelayError> {
        if self.server.host.is_empty() {
            return Err(RelayError::Config {
                field: "server.host".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.server.max_connections == 0 {
            return Err(RelayError::Config {
                field: "server.max_connections".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.dispatch.timeout_secs == 0 || self.dispatch.queue_capacity == 0 {
            return Err(RelayError::Config {
                field: "dispatch".to_owned(),
                reason: "timeout_secs and queue_capacity must be greater than 0".to_owned(),
            });
        }

        if self.dispatch.workers == 0 {
            return Err(RelayError::Config {
                field: "dispatch.workers".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        let mut seen = std::collections::HashSet::new();
        for (idx, rule) in self.rules.iter().enumerate() {
            if rule.name.is_empty() {
                return Err(RelayError::Config {
                    field: format!("rules[{idx}].name"),
                    reason: "must not be empty".to_owned(),
                });
            }
            if !seen.insert(rule.name.as_str()) {
                return Err(RelayError::Config {
                    field: format!("rules[{idx}].name"),
                    reason: format!("duplicate rule name '{}'", rule.name),
                });
            }
            RegexBuilder::new(&rule.regex)
                .case_insensitive(true)
                .build()
                .map_err(|e| RelayError::Config {
                    field: format!("rules[{idx}].regex"),
                    reason: format!("invalid pattern: {e}"),
                })?;
            if rule.webhook.url.is_empty() {
                return Err(RelayError::Config {
                    field: format!("rules[{idx}].webhook.url"),
                    reason: "must not be empty".to_owned(),
                });
            }
        }

        if let Some(hook) = &self.test_webhook
            && hook.url.is_empty()
        {
            return Err(RelayError::Config {
                field: "test_webhook.url".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        match self.log.format.as_str() {
            "json" | "pretty" => {}
            other => {
                return Err(RelayError::Config {
                    field: "log.format".to_owned(),
                    reason: format!("unknown format '{other}', expected 'json' or 'pretty'"),
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RelayConfig::default();
        config.validate().unwrap();
        assert_eq!(config.server.bind_addr(), "0.0.0.0:12080");
        assert!(!config.test_mode);
        assert!(config.rules.is_empty());
    }

    #[test]
    fn parse_empty_json_uses_defaults() {
        let config = RelayConfig::parse("{}").unwrap();
        assert_eq!(config.server.port, 12080);
        assert_eq!(config.dispatch.timeout_secs, 5);
    }

    #[test]
    fn parse_full_json() {
        let json = r#"{
            "server": { "host": "127.0.0.1", "port": 601 },
            "test_mode": true,
            "test_webhook": { "url": "http://hook/test", "title": "Syslog test" },
            "rules": [
                {
                    "name": "link_flap",
                    "regex": "\\blink\\s+(up|down)\\.",
                    "webhook": {
                        "url": "http://hook/alerts",
                        "title": "Link state",
                        "url_field": "http://nas/logs"
                    }
                }
            ]
        }"#;
        let config = RelayConfig::parse(json).unwrap();
        config.validate().unwrap();
        assert_eq!(config.server.bind_addr(), "127.0.0.1:601");
        assert!(config.test_mode);
        assert_eq!(config.rules.len(), 1);
        assert_eq!(config.rules[0].name, "link_flap");
        assert_eq!(config.rules[0].webhook.url_field, "http://nas/logs");
        // url_field는 생략 가능
        assert_eq!(config.test_webhook.as_ref().unwrap().url_field, "");
    }

    #[test]
    fn parse_invalid_json_returns_error() {
        let result = RelayConfig::parse("{not json");
        assert!(matches!(result, Err(RelayError::Config { .. })));
    }

    #[test]
    fn validate_rejects_invalid_regex() {
        let mut config = RelayConfig::default();
        config.rules.push(RuleConfig {
            name: "bad".to_owned(),
            regex: "[unclosed".to_owned(),
            webhook: WebhookTarget {
                url: "http://hook".to_owned(),
                ..Default::default()
            },
        });
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("rules[0].regex"));
    }

    #[test]
    fn validate_rejects_duplicate_rule_names() {
        let mut config = RelayConfig::default();
        for _ in 0..2 {
            config.rules.push(RuleConfig {
                name: "dup".to_owned(),
                regex: ".*".to_owned(),
                webhook: WebhookTarget {
                    url: "http://hook".to_owned(),
                    ..Default::default()
                },
            });
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_webhook_url() {
        let mut config = RelayConfig::default();
        config.rules.push(RuleConfig {
            name: "r".to_owned(),
            regex: ".*".to_owned(),
            webhook: WebhookTarget::default(),
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_workers() {
        let mut config = RelayConfig::default();
        config.dispatch.workers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_unknown_log_format() {
        let mut config = RelayConfig::default();
        config.log.format = "xml".to_owned();
        assert!(config.validate().is_err());
    }

    #[tokio::test]
    async fn load_nonexistent_file_returns_config_error() {
        let result = RelayConfig::from_file("/nonexistent/config.json").await;
        assert!(matches!(result, Err(RelayError::Config { .. })));
    }

    #[tokio::test]
    async fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        tokio::fs::write(&path, r#"{"server": {"port": 5140}}"#)
            .await
            .unwrap();
        let config = RelayConfig::from_file(&path).await.unwrap();
        assert_eq!(config.server.port, 5140);
    }
}
