//! 릴레이 에러 타입
//!
//! [`RelayError`]는 릴레이 내부에서 발생하는 모든 에러를 표현합니다.
//! 연결 단위 에러(프레이밍, 소켓 읽기 실패)는 해당 연결만 종료시키며,
//! 프로세스를 중단시키는 것은 시작 시점의 설정 에러뿐입니다.

/// 릴레이 도메인 에러
///
/// 프레이밍, 설정, 리스너 등 릴레이 내부의 모든 에러 상황을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// RFC 6587 프레이밍 에러 -- 바이트 스트림 동기화 상실
    #[error("framing error: {reason}")]
    Framing {
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러 (잘못된 정규식, 필수 필드 누락 등)
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// 리스너 에러 (바인드 실패, accept 실패)
    #[error("listener error: {reason}")]
    Listener {
        /// 에러 사유
        reason: String,
    },

    /// HTTP 클라이언트 초기화 에러
    #[error("http client error: {0}")]
    HttpClient(String),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn framing_error_display() {
        let err = RelayError::Framing {
            reason: "length prefix too long".to_owned(),
        };
        assert!(err.to_string().contains("framing error"));
        assert!(err.to_string().contains("length prefix too long"));
    }

    #[test]
    fn config_error_display() {
        let err = RelayError::Config {
            field: "rules[0].regex".to_owned(),
            reason: "invalid pattern".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("rules[0].regex"));
        assert!(msg.contains("invalid pattern"));
    }

    #[test]
    fn io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: RelayError = io.into();
        assert!(matches!(err, RelayError::Io(_)));
    }
}
