//! RFC 6587 octet-counting 프레이머
//!
//! TCP 바이트 스트림을 `"<LEN><SP><LEN바이트 메시지>"` 형식의
//! 프레임 단위로 분리합니다. TCP 단편화에 무관하게 동일한 프레임
//! 시퀀스를 생성합니다 (pull 방식, 미완성 프레임은 버퍼에 유지).
//!
//! # 프레이밍 에러
//! 길이 접두사가 깨지면 스트림 동기화를 복구할 수 없으므로,
//! 에러 발생 시 호출자는 연결을 닫아야 합니다. 부분 데이터를
//! 추측하여 복구하지 않습니다.

use bytes::{Buf, Bytes, BytesMut};

use crate::error::RelayError;

/// 길이 접두사 최대 자릿수
///
/// 7자리면 메시지 크기가 10MB 미만으로 제한되어, 오동작하는
/// 송신자가 메모리를 무한정 키우는 것을 막습니다.
pub const MAX_LEN_DIGITS: usize = 7;

/// Octet-counting 프레임 디코더
///
/// 연결별 수신 버퍼(`BytesMut`)에서 완성된 프레임을 하나씩 꺼냅니다.
///
/// # 사용 예시
/// ```
/// use bytes::BytesMut;
/// use loghook::framing::OctetCountFramer;
///
/// let framer = OctetCountFramer::new();
/// let mut buf = BytesMut::from(&b"5 hello3 abc"[..]);
/// assert_eq!(framer.decode(&mut buf).unwrap().unwrap(), "hello");
/// assert_eq!(framer.decode(&mut buf).unwrap().unwrap(), "abc");
/// assert!(framer.decode(&mut buf).unwrap().is_none());
/// ```
#[derive(Debug, Clone)]
pub struct OctetCountFramer {
    /// 길이 접두사 최대 자릿수
    max_digits: usize,
}

impl OctetCountFramer {
    /// 기본 설정으로 새 프레이머를 생성합니다.
    pub fn new() -> Self {
        Self {
            max_digits: MAX_LEN_DIGITS,
        }
    }

    /// 길이 접두사 최대 자릿수를 설정합니다.
    pub fn with_max_digits(mut self, max_digits: usize) -> Self {
        self.max_digits = max_digits;
        self
    }

    /// 버퍼에서 완성된 프레임 하나를 꺼냅니다.
    ///
    /// # Returns
    /// - `Ok(Some(frame))`: 완성된 프레임. 버퍼는 프레임 끝으로 전진.
    /// - `Ok(None)`: 데이터 부족. 완성되지 않은 바이트는 버퍼에 유지.
    /// - `Err(_)`: 프레이밍 에러. 스트림 동기화 상실, 연결을 닫아야 함.
    pub fn decode(&self, buf: &mut BytesMut) -> Result<Option<Bytes>, RelayError> {
        let mut digits = 0;
        while digits < buf.len() && buf[digits].is_ascii_digit() {
            digits += 1;
            if digits > self.max_digits {
                return Err(RelayError::Framing {
                    reason: format!("length prefix exceeds {} digits", self.max_digits),
                });
            }
        }

        if digits == 0 {
            if buf.is_empty() {
                return Ok(None);
            }
            return Err(RelayError::Framing {
                reason: format!(
                    "expected digit at start of length prefix, got 0x{:02x}",
                    buf[0]
                ),
            });
        }

        // "007" 같은 선행 0은 허용하지 않음 (단독 "0"만 유효)
        if digits > 1 && buf[0] == b'0' {
            return Err(RelayError::Framing {
                reason: "length prefix has leading zero".to_owned(),
            });
        }

        if digits == buf.len() {
            // 구분자가 아직 도착하지 않음
            return Ok(None);
        }

        if buf[digits] != b' ' {
            return Err(RelayError::Framing {
                reason: format!(
                    "expected SP after length prefix, got 0x{:02x}",
                    buf[digits]
                ),
            });
        }

        // 최대 7자리이므로 usize 오버플로 불가
        let len = buf[..digits]
            .iter()
            .fold(0usize, |acc, b| acc * 10 + usize::from(b - b'0'));

        if buf.len() < digits + 1 + len {
            return Ok(None);
        }

        buf.advance(digits + 1);
        Ok(Some(buf.split_to(len).freeze()))
    }
}

impl Default for OctetCountFramer {
    fn default() -> Self {
        Self::new()
    }
}
