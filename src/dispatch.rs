//! Webhook 디스패처 -- 유한 큐 + 고정 워커 풀
//!
//! 수신 경로(연결 핸들러)와 전송 경로(HTTP POST)를 유한 채널로
//! 분리합니다. 느린 webhook 엔드포인트가 Syslog 수신을 막지 않도록,
//! [`DispatcherHandle::submit`]은 절대 블로킹하지 않으며 큐가 가득
//! 차면 가장 새 요청을 드롭합니다 (drop-newest).
//!
//! 전송은 fire-and-forget입니다. 타임아웃, 연결 거부, non-2xx 응답은
//! 모두 로그와 카운터로만 기록되고 재시도하지 않습니다.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::DispatchConfig;
use crate::error::RelayError;
use crate::metrics as m;

/// 전송 대기열에 들어가는 webhook 요청 1건
///
/// 규칙 엔진이 생성하며, 원본 레코드와의 연결은 이 시점에 끊깁니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchRequest {
    /// POST 대상 엔드포인트 URL
    pub target: String,
    /// 페이로드 `title` 값
    pub title: String,
    /// 페이로드 `msg` 값 (매칭된 텍스트)
    pub msg: String,
    /// 페이로드 `url` 값 (알림이 가리킬 링크, 빈 문자열 가능)
    pub url: String,
}

/// Webhook POST 본문
///
/// 필드 구성은 고정이며 엔드포인트별로 달라지지 않습니다.
#[derive(Debug, Serialize)]
struct WebhookPayload<'a> {
    title: &'a str,
    msg: &'a str,
    url: &'a str,
}

/// 디스패처 본체 -- 워커 태스크의 소유자
///
/// [`Dispatcher::spawn`]으로 생성하며, 반환된 [`DispatcherHandle`]을
/// 통해서만 요청을 넣을 수 있습니다. 셧다운 시 [`Dispatcher::shutdown`]이
/// 워커 종료를 기다립니다.
pub struct Dispatcher {
    workers: Vec<JoinHandle<()>>,
}

/// 디스패처 제출 핸들 (복제 가능, 연결 핸들러마다 하나씩)
#[derive(Clone)]
pub struct DispatcherHandle {
    tx: mpsc::Sender<DispatchRequest>,
}

impl Dispatcher {
    /// HTTP 클라이언트와 워커 풀을 생성합니다.
    ///
    /// 모든 워커는 하나의 [`reqwest::Client`]를 공유하며,
    /// 요청별 타임아웃은 `config.timeout_secs`로 고정됩니다.
    pub fn spawn(
        config: &DispatchConfig,
        cancel: CancellationToken,
    ) -> Result<(Self, DispatcherHandle), RelayError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| RelayError::HttpClient(e.to_string()))?;

        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let rx = Arc::new(Mutex::new(rx));

        let workers = (0..config.workers)
            .map(|worker_id| {
                let client = client.clone();
                let rx = Arc::clone(&rx);
                let cancel = cancel.clone();
                tokio::spawn(worker_loop(worker_id, client, rx, cancel))
            })
            .collect();

        Ok((Self { workers }, DispatcherHandle { tx }))
    }

    /// 모든 워커가 종료될 때까지 기다립니다.
    ///
    /// 취소 토큰이 먼저 트리거되어 있어야 합니다. 진행 중이던 전송은
    /// 완료되지만, 큐에 남은 요청은 폐기됩니다.
    pub async fn shutdown(self) {
        for worker in self.workers {
            let _ = worker.await;
        }
    }
}

#[cfg(test)]
impl DispatcherHandle {
    /// 워커 없이 채널 송신단만 감싸는 테스트용 핸들
    pub(crate) fn from_sender(tx: mpsc::Sender<DispatchRequest>) -> Self {
        Self { tx }
    }
}

impl DispatcherHandle {
    /// 요청을 큐에 넣습니다. 블로킹하지 않습니다.
    ///
    /// 큐가 가득 차면 이 요청을 드롭하고 경고를 남깁니다.
    /// 호출자(연결 핸들러)는 결과와 무관하게 다음 프레임으로 진행합니다.
    pub fn submit(&self, request: DispatchRequest) {
        match self.tx.try_send(request) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(request)) => {
                metrics::counter!(m::DISPATCH_DROPPED_TOTAL).increment(1);
                warn!(target = %request.target, "dispatch queue full, dropping webhook request");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("dispatcher is shut down, dropping webhook request");
            }
        }
    }
}

/// 워커 루프 -- 큐에서 요청을 꺼내 순차 전송
async fn worker_loop(
    worker_id: usize,
    client: reqwest::Client,
    rx: Arc<Mutex<mpsc::Receiver<DispatchRequest>>>,
    cancel: CancellationToken,
) {
    debug!(worker_id, "dispatch worker started");
    loop {
        // 수신 대기 동안만 락을 점유
        let next = {
            let mut rx = rx.lock().await;
            tokio::select! {
                _ = cancel.cancelled() => None,
                request = rx.recv() => request,
            }
        };
        let Some(request) = next else {
            break;
        };
        deliver(&client, &request).await;
    }
    debug!(worker_id, "dispatch worker stopped");
}

/// 요청 1건을 전송합니다. 실패해도 재시도하지 않습니다.
async fn deliver(client: &reqwest::Client, request: &DispatchRequest) {
    let payload = WebhookPayload {
        title: &request.title,
        msg: &request.msg,
        url: &request.url,
    };

    match client.post(&request.target).json(&payload).send().await {
        Ok(response) if response.status().is_success() => {
            metrics::counter!(m::DISPATCH_DELIVERED_TOTAL).increment(1);
            info!(target = %request.target, status = %response.status(), "webhook delivered");
        }
        Ok(response) => {
            metrics::counter!(m::DISPATCH_FAILED_TOTAL).increment(1);
            warn!(
                target = %request.target,
                status = %response.status(),
                "webhook endpoint returned error status"
            );
        }
        Err(e) => {
            metrics::counter!(m::DISPATCH_FAILED_TOTAL).increment(1);
            warn!(target = %request.target, error = %e, "webhook delivery failed");
        }
    }
}
