//! 메트릭 이름 상수
//!
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`를 호출합니다.
//! 레코더(Prometheus exporter 등) 설치는 임베더의 몫이며,
//! 레코더가 없으면 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//! - 접두어: `loghook_`
//! - 접미어: `_total` (counter)

/// 수락된 TCP 연결 수 (counter)
pub const CONNECTIONS_TOTAL: &str = "loghook_connections_total";

/// 디코딩된 프레임 수 (counter)
pub const FRAMES_TOTAL: &str = "loghook_frames_total";

/// 프레이밍 에러로 종료된 연결 수 (counter)
pub const FRAMING_ERRORS_TOTAL: &str = "loghook_framing_errors_total";

/// RFC 5424 파싱 실패로 원문 폴백한 레코드 수 (counter)
pub const PARSE_FALLBACK_TOTAL: &str = "loghook_parse_fallback_total";

/// 규칙 매칭 성공 수 (counter)
pub const RULE_MATCHES_TOTAL: &str = "loghook_rule_matches_total";

/// 전달에 성공한 webhook 수 (counter)
pub const DISPATCH_DELIVERED_TOTAL: &str = "loghook_dispatch_delivered_total";

/// 전달에 실패한 webhook 수 (counter, 타임아웃/연결 거부/non-2xx)
pub const DISPATCH_FAILED_TOTAL: &str = "loghook_dispatch_failed_total";

/// 큐 포화로 드롭된 webhook 요청 수 (counter)
pub const DISPATCH_DROPPED_TOTAL: &str = "loghook_dispatch_dropped_total";
