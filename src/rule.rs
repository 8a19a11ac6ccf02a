//! 규칙 엔진 -- 정규식 매칭과 webhook 요청 생성
//!
//! 설정의 규칙 목록을 시작 시점에 한 번 컴파일하고, 레코드마다
//! 전체 규칙을 평가합니다. 매칭 성공이 다음 규칙 평가를 막지
//! 않으므로 (short-circuit 없음), 하나의 레코드가 여러 webhook을
//! 동시에 트리거할 수 있습니다.
//!
//! 모든 패턴은 대소문자 구분 없이, 앵커 없이 텍스트 내 어디서든
//! 매칭됩니다. "LINK DOWN"을 내보내는 장비와 "link down"을 내보내는
//! 장비를 규칙 하나로 잡기 위한 선택입니다.

use regex::{Regex, RegexBuilder};
use tracing::warn;

use crate::config::{RuleConfig, WebhookTarget};
use crate::dispatch::DispatchRequest;
use crate::error::RelayError;
use crate::metrics as m;
use crate::parser::Record;

/// 컴파일된 매칭 규칙 1개
#[derive(Debug, Clone)]
pub struct Rule {
    /// 규칙 이름 (진단용)
    pub name: String,
    /// 컴파일된 패턴 (대소문자 무시)
    pattern: Regex,
    /// 매칭 시 호출할 webhook
    webhook: WebhookTarget,
}

impl Rule {
    /// 레코드의 매칭 대상 텍스트에 패턴이 존재하는지 확인합니다.
    pub fn matches(&self, record: &Record) -> bool {
        self.pattern.is_match(record.match_text())
    }
}

/// 컴파일된 규칙 집합 (선언 순서 유지)
///
/// 시작 이후 불변이며, 여러 연결 핸들러가 읽기 전용으로 공유합니다.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    /// 설정의 규칙 목록을 컴파일합니다.
    ///
    /// 잘못된 패턴이 하나라도 있으면 전체가 실패합니다.
    /// 설정 검증을 통과한 입력에 대해서는 실패하지 않습니다.
    pub fn compile(configs: &[RuleConfig]) -> Result<Self, RelayError> {
        let rules = configs
            .iter()
            .enumerate()
            .map(|(idx, config)| {
                let pattern = RegexBuilder::new(&config.regex)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| RelayError::Config {
                        field: format!("rules[{idx}].regex"),
                        reason: format!("invalid pattern: {e}"),
                    })?;
                Ok(Rule {
                    name: config.name.clone(),
                    pattern,
                    webhook: config.webhook.clone(),
                })
            })
            .collect::<Result<Vec<_>, RelayError>>()?;
        Ok(Self { rules })
    }

    /// 규칙 수를 반환합니다.
    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// 규칙이 하나도 없으면 true를 반환합니다.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// 레코드를 전체 규칙에 대해 평가합니다.
    ///
    /// 매칭된 규칙마다 webhook 요청 1건을 생성하며,
    /// 반환 순서는 규칙 선언 순서와 같습니다.
    pub fn evaluate(&self, record: &Record) -> Vec<DispatchRequest> {
        let mut requests = Vec::new();
        for rule in &self.rules {
            if !rule.matches(record) {
                continue;
            }
            metrics::counter!(m::RULE_MATCHES_TOTAL, "rule" => rule.name.clone()).increment(1);
            warn!(rule = %rule.name, msg = %record.match_text(), "rule matched");
            requests.push(DispatchRequest {
                target: rule.webhook.url.clone(),
                title: rule.webhook.title.clone(),
                msg: record.match_text().to_owned(),
                url: rule.webhook.url_field.clone(),
            });
        }
        requests
    }
}
