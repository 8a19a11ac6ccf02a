//! RFC 5424 레코드 파서 -- 구조화 파싱 실패 시 원문 폴백
//!
//! [RFC 5424](https://tools.ietf.org/html/rfc5424) 형식:
//! ```text
//! <PRI>VERSION TIMESTAMP HOSTNAME APP-NAME PROCID MSGID STRUCTURED-DATA MSG
//! ```
//!
//! 파싱은 절대 실패하지 않습니다. 구조 위반(PRI 누락, 잘못된 타임스탬프,
//! 필드 부족 등)이 있으면 `structured`가 비고, 규칙 매칭은 디코딩된
//! 원문 전체를 대상으로 동작합니다. 필드 없는 평문 Syslog를 내보내는
//! 가전/네트워크 장비도 규칙에 걸릴 수 있어야 하기 때문입니다.

use chrono::{DateTime, FixedOffset};

use crate::metrics as m;

/// RFC 5424에서 유효한 최대 PRI 값
/// facility 최댓값 23 * 8 + severity 최댓값 7 = 191
const MAX_PRI: u8 = 191;

/// 규칙 엔진에 전달되는 논리 단위
///
/// 프레임 하나에서 생성되며, 매칭이 끝나면 폐기됩니다.
/// 생성 이후 불변입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    /// 프레임 바이트의 텍스트 디코딩 결과 (UTF-8, 실패 시 lossy)
    pub raw_text: String,
    /// RFC 5424 구조화 필드. 프레임이 형식에 맞을 때만 존재.
    pub structured: Option<Rfc5424Message>,
}

impl Record {
    /// 규칙 매칭 대상 텍스트를 반환합니다.
    ///
    /// 구조화 파싱에 성공했으면 MSG 필드, 아니면 원문 전체입니다.
    pub fn match_text(&self) -> &str {
        match &self.structured {
            Some(msg) => &msg.msg,
            None => &self.raw_text,
        }
    }
}

/// 파싱된 RFC 5424 메시지 필드
///
/// STRUCTURED-DATA는 의미 해석 없이 불투명한 문자열로 보존합니다.
#[derive(Debug, Clone, PartialEq)]
pub struct Rfc5424Message {
    /// facility (PRI / 8)
    pub facility: u8,
    /// severity (PRI % 8)
    pub severity: u8,
    /// 프로토콜 버전
    pub version: u8,
    /// 타임스탬프 (NILVALUE면 None)
    pub timestamp: Option<DateTime<FixedOffset>>,
    /// 호스트명 (NILVALUE면 None)
    pub hostname: Option<String>,
    /// 애플리케이션 이름 (NILVALUE면 None)
    pub app_name: Option<String>,
    /// 프로세스 ID (NILVALUE면 None)
    pub proc_id: Option<String>,
    /// 메시지 ID (NILVALUE면 None)
    pub msg_id: Option<String>,
    /// STRUCTURED-DATA 원문 (NILVALUE면 None)
    pub structured_data: Option<String>,
    /// 메시지 본문 (공백 포함 그대로, 비어 있을 수 있음)
    pub msg: String,
}

/// RFC 5424 레코드 파서
///
/// 프레임 바이트를 [`Record`]로 변환합니다. 에러를 반환하지 않으며,
/// `structured`의 부재가 곧 구조화 파싱 실패의 신호입니다.
#[derive(Debug, Clone, Default)]
pub struct RecordParser;

impl RecordParser {
    /// 새 파서를 생성합니다.
    pub fn new() -> Self {
        Self
    }

    /// 프레임 하나를 레코드로 변환합니다.
    pub fn parse(&self, frame: &[u8]) -> Record {
        let raw_text = String::from_utf8_lossy(frame).into_owned();
        let structured = Self::parse_rfc5424(&raw_text);
        if structured.is_none() {
            metrics::counter!(m::PARSE_FALLBACK_TOTAL).increment(1);
        }
        Record {
            raw_text,
            structured,
        }
    }

    /// RFC 5424 구조화 파싱을 시도합니다.
    ///
    /// 필수 토큰이 하나라도 빠지거나 형식이 틀리면 None을 반환하고,
    /// 호출자는 원문 폴백으로 전환합니다.
    fn parse_rfc5424(input: &str) -> Option<Rfc5424Message> {
        // PRI: <NNN>, 1~3자리 숫자, 0~191
        let rest = input.strip_prefix('<')?;
        let (pri_str, rest) = rest.split_once('>')?;
        if pri_str.is_empty()
            || pri_str.len() > 3
            || !pri_str.bytes().all(|b| b.is_ascii_digit())
        {
            return None;
        }
        let pri: u8 = pri_str.parse().ok()?;
        if pri > MAX_PRI {
            return None;
        }

        // VERSION: 한 자리 숫자 + SP
        let (version_str, body) = rest.split_once(' ')?;
        if version_str.len() != 1 || !version_str.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let version: u8 = version_str.parse().ok()?;

        // TIMESTAMP HOSTNAME APP-NAME PROCID MSGID, 그 뒤에 SD+MSG
        let mut parts = body.splitn(6, ' ');
        let timestamp_str = parts.next()?;
        let hostname = parts.next()?;
        let app_name = parts.next()?;
        let proc_id = parts.next()?;
        let msg_id = parts.next()?;
        let sd_and_msg = parts.next()?;

        // 연속 공백은 빈 토큰을 만들며, 이는 형식 위반
        for field in [timestamp_str, hostname, app_name, proc_id, msg_id] {
            if field.is_empty() {
                return None;
            }
        }

        let timestamp = match timestamp_str {
            "-" => None,
            ts => Some(DateTime::parse_from_rfc3339(ts).ok()?),
        };

        let (structured_data, msg) = Self::split_sd_and_msg(sd_and_msg)?;

        Some(Rfc5424Message {
            facility: pri / 8,
            severity: pri % 8,
            version,
            timestamp,
            hostname: Self::nilvalue(hostname),
            app_name: Self::nilvalue(app_name),
            proc_id: Self::nilvalue(proc_id),
            msg_id: Self::nilvalue(msg_id),
            structured_data,
            msg: msg.to_owned(),
        })
    }

    /// NILVALUE(`-`)를 None으로 변환합니다.
    fn nilvalue(value: &str) -> Option<String> {
        if value == "-" {
            None
        } else {
            Some(value.to_owned())
        }
    }

    /// STRUCTURED-DATA와 MSG를 분리합니다.
    ///
    /// SD는 `-` 또는 하나 이상의 `[...]` 블록입니다. 블록 내부의
    /// 따옴표/이스케이프를 추적하여 `]`가 값 안에 있어도 깨지지 않습니다.
    /// 닫히지 않은 블록이나 그 외 형식은 None (원문 폴백)입니다.
    fn split_sd_and_msg(input: &str) -> Option<(Option<String>, &str)> {
        if input == "-" {
            return Some((None, ""));
        }
        if let Some(msg) = input.strip_prefix("- ") {
            return Some((None, msg));
        }
        if !input.starts_with('[') {
            return None;
        }

        let bytes = input.as_bytes();
        let mut idx = 0;
        let mut in_quote = false;
        let mut escaped = false;
        let mut depth = 0;

        loop {
            if idx == bytes.len() {
                if depth == 0 {
                    // SD만 있고 MSG 없음
                    return Some((Some(input.to_owned()), ""));
                }
                // 닫히지 않은 SD 블록
                return None;
            }

            let b = bytes[idx];
            if escaped {
                escaped = false;
            } else {
                match b {
                    b'\\' if in_quote => escaped = true,
                    b'"' => in_quote = !in_quote,
                    b'[' if !in_quote => depth += 1,
                    b']' if !in_quote => depth -= 1,
                    _ => {}
                }
            }
            idx += 1;

            // 블록이 닫힌 지점에서 다음 문자가 '['가 아니면 SD 종료
            if depth == 0 && (idx == bytes.len() || bytes[idx] != b'[') {
                break;
            }
        }

        let sd = Some(input[..idx].to_owned());
        if idx == bytes.len() {
            return Some((sd, ""));
        }
        // SD 뒤에는 반드시 단일 SP가 오고, 나머지 전부가 MSG
        if bytes[idx] != b' ' {
            return None;
        }
        Some((sd, &input[idx + 1..]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(input: &[u8]) -> Record {
        RecordParser::new().parse(input)
    }

    #[test]
    fn parse_rfc5424_basic() {
        let record =
            parse(b"<34>1 2024-01-15T12:00:00Z myhost sshd 1234 ID47 - Failed password for root");
        let msg = record.structured.as_ref().unwrap();
        assert_eq!(msg.facility, 4);
        assert_eq!(msg.severity, 2);
        assert_eq!(msg.version, 1);
        assert_eq!(msg.hostname.as_deref(), Some("myhost"));
        assert_eq!(msg.app_name.as_deref(), Some("sshd"));
        assert_eq!(msg.proc_id.as_deref(), Some("1234"));
        assert_eq!(msg.msg_id.as_deref(), Some("ID47"));
        assert!(msg.structured_data.is_none());
        assert_eq!(record.match_text(), "Failed password for root");
    }

    #[test]
    fn parse_all_nilvalue_fields() {
        let record = parse(b"<134>1 - - - - - - link up.");
        let msg = record.structured.as_ref().unwrap();
        assert!(msg.timestamp.is_none());
        assert!(msg.hostname.is_none());
        assert!(msg.app_name.is_none());
        assert_eq!(record.match_text(), "link up.");
    }

    #[test]
    fn match_text_falls_back_to_raw_for_plain_text() {
        let record = parse(b"link down.");
        assert!(record.structured.is_none());
        assert_eq!(record.match_text(), "link down.");
    }

    #[test]
    fn match_text_is_msg_for_structured() {
        let record = parse(b"<34>1 2024-01-15T12:00:00Z host app - - - some message text");
        assert_eq!(record.match_text(), "some message text");
    }

    #[test]
    fn msg_preserves_embedded_whitespace() {
        let record = parse(b"<34>1 - host app - - - a  b\tc ");
        assert_eq!(record.match_text(), "a  b\tc ");
    }

    #[test]
    fn empty_msg_after_nil_sd() {
        let record = parse(b"<34>1 - host app - - -");
        let msg = record.structured.as_ref().unwrap();
        assert_eq!(msg.msg, "");
    }

    #[test]
    fn structured_data_kept_opaque() {
        let record =
            parse(b"<34>1 - host app - - [meta user=\"admin\" ip=\"1.2.3.4\"] Login ok");
        let msg = record.structured.as_ref().unwrap();
        assert_eq!(
            msg.structured_data.as_deref(),
            Some("[meta user=\"admin\" ip=\"1.2.3.4\"]")
        );
        assert_eq!(msg.msg, "Login ok");
    }

    #[test]
    fn structured_data_multiple_elements() {
        let record = parse(b"<34>1 - host app - - [id1 a=\"1\"][id2 b=\"2\"] msg");
        let msg = record.structured.as_ref().unwrap();
        assert_eq!(
            msg.structured_data.as_deref(),
            Some("[id1 a=\"1\"][id2 b=\"2\"]")
        );
        assert_eq!(msg.msg, "msg");
    }

    #[test]
    fn structured_data_with_escaped_quote_and_bracket() {
        let record = parse(br#"<34>1 - host app - - [x v="a \" ] b"] msg"#);
        let msg = record.structured.as_ref().unwrap();
        assert_eq!(msg.structured_data.as_deref(), Some(r#"[x v="a \" ] b"]"#));
        assert_eq!(msg.msg, "msg");
    }

    #[test]
    fn structured_data_without_msg() {
        let record = parse(b"<34>1 - host app - - [meta a=\"1\"]");
        let msg = record.structured.as_ref().unwrap();
        assert_eq!(msg.structured_data.as_deref(), Some("[meta a=\"1\"]"));
        assert_eq!(msg.msg, "");
    }

    #[test]
    fn unclosed_structured_data_falls_back() {
        let record = parse(b"<34>1 - host app - - [meta a=\"1\" msg");
        assert!(record.structured.is_none());
    }

    #[test]
    fn timestamp_parsed_as_rfc3339() {
        let record = parse(b"<34>1 2024-01-15T12:00:00.123+09:00 host app - - - msg");
        let ts = record.structured.unwrap().timestamp.unwrap();
        assert_eq!(ts.offset().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn invalid_timestamp_falls_back() {
        let record = parse(b"<34>1 not-a-timestamp host app - - - msg");
        assert!(record.structured.is_none());
        assert_eq!(
            record.match_text(),
            "<34>1 not-a-timestamp host app - - - msg"
        );
    }

    #[test]
    fn missing_pri_falls_back() {
        assert!(parse(b"34>1 - - - - - - msg").structured.is_none());
    }

    #[test]
    fn unterminated_pri_falls_back() {
        assert!(parse(b"<34").structured.is_none());
    }

    #[test]
    fn non_numeric_pri_falls_back() {
        assert!(parse(b"<ab>1 - - - - - - msg").structured.is_none());
    }

    #[test]
    fn pri_out_of_range_falls_back() {
        assert!(parse(b"<192>1 - - - - - - msg").structured.is_none());
    }

    #[test]
    fn pri_boundary_191_accepted() {
        let record = parse(b"<191>1 - - - - - - msg");
        let msg = record.structured.unwrap();
        assert_eq!(msg.facility, 23);
        assert_eq!(msg.severity, 7);
    }

    #[test]
    fn non_digit_version_falls_back() {
        assert!(parse(b"<34>x - - - - - - msg").structured.is_none());
    }

    #[test]
    fn bsd_syslog_falls_back() {
        // RFC 3164 (버전 없음)는 구조화 파싱 대상이 아님
        let record = parse(b"<34>Jan 15 12:00:00 host sshd: Failed password");
        assert!(record.structured.is_none());
        assert!(record.match_text().contains("Failed password"));
    }

    #[test]
    fn too_few_fields_falls_back() {
        assert!(parse(b"<34>1 2024-01-15T12:00:00Z host").structured.is_none());
    }

    #[test]
    fn consecutive_spaces_fall_back() {
        assert!(parse(b"<34>1 -  host app - - - msg").structured.is_none());
    }

    #[test]
    fn bare_sd_token_without_bracket_falls_back() {
        // SD 자리에 '-'도 '['도 아닌 토큰
        let record = parse(b"<134>1 - - - - - link up.");
        assert!(record.structured.is_none());
        assert_eq!(record.match_text(), "<134>1 - - - - - link up.");
    }

    #[test]
    fn invalid_utf8_is_lossy_never_fatal() {
        let record = parse(b"\xff\xfe link down.");
        assert!(record.structured.is_none());
        assert!(record.match_text().contains("link down."));
    }

    #[test]
    fn empty_frame_is_empty_record() {
        let record = parse(b"");
        assert!(record.structured.is_none());
        assert_eq!(record.match_text(), "");
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn parse_arbitrary_bytes_does_not_panic(
                bytes in prop::collection::vec(any::<u8>(), 0..1000),
            ) {
                let _ = RecordParser::new().parse(&bytes);
            }

            #[test]
            fn parse_valid_pri_range(pri in 0u8..=191) {
                let raw = format!("<{pri}>1 2024-01-15T12:00:00Z host app - - - msg");
                let record = RecordParser::new().parse(raw.as_bytes());
                let msg = record.structured.unwrap();
                prop_assert_eq!(msg.facility, pri / 8);
                prop_assert_eq!(msg.severity, pri % 8);
            }

            #[test]
            fn match_text_always_defined(
                bytes in prop::collection::vec(any::<u8>(), 0..300),
            ) {
                let record = RecordParser::new().parse(&bytes);
                // 폴백 불변식: 구조화 실패 시 match_text == raw_text
                if record.structured.is_none() {
                    prop_assert_eq!(record.match_text(), record.raw_text.as_str());
                }
            }
        }
    }
}
