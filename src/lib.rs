#![doc = include_str!("../README.md")]
//!
//! # 모듈 구성
//! - [`framing`]: RFC 6587 octet-counting 프레임 분리
//! - [`parser`]: RFC 5424 구조화 파싱 (실패 시 원문 폴백)
//! - [`rule`]: 정규식 규칙 평가 및 webhook 요청 생성
//! - [`dispatch`]: 유한 큐 기반 webhook 전송 워커 풀
//! - [`server`]: TCP 리스너 및 연결별 핸들러
//! - [`config`]: config.json 로딩과 유효성 검증
//! - [`error`]: 도메인 에러 타입
//! - [`metrics`]: 메트릭 이름 상수

pub mod cli;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod framing;
pub mod logging;
pub mod metrics;
pub mod parser;
pub mod rule;
pub mod server;

pub use config::RelayConfig;
pub use dispatch::{DispatchRequest, Dispatcher, DispatcherHandle};
pub use error::RelayError;
pub use framing::OctetCountFramer;
pub use parser::{Record, RecordParser, Rfc5424Message};
pub use rule::{Rule, RuleSet};
pub use server::RelayServer;
