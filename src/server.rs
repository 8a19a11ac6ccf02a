//! TCP 리스너와 연결 핸들러
//!
//! 연결마다 독립 태스크를 생성하고, 각 태스크는
//! 프레이머 -> 파서 -> 규칙 엔진 -> 디스패처 순으로 프레임을
//! 처리합니다. 연결 사이에는 공유 상태가 없으므로 한 연결의
//! 에러가 다른 연결에 영향을 주지 않습니다.
//!
//! 프레이밍 에러는 해당 연결만 닫습니다. 길이 접두사가 깨진
//! 스트림은 어디서 다음 프레임이 시작하는지 알 수 없기 때문입니다.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{RelayConfig, WebhookTarget};
use crate::dispatch::{DispatchRequest, DispatcherHandle};
use crate::error::RelayError;
use crate::framing::OctetCountFramer;
use crate::metrics as m;
use crate::parser::RecordParser;
use crate::rule::RuleSet;

/// 연결별 수신 버퍼 초기 크기
const READ_BUF_CAPACITY: usize = 4096;

/// Syslog TCP 릴레이 서버
///
/// [`RelayServer::run`]이 리스너를 바인드하고 accept 루프를 돕니다.
/// 셧다운은 취소 토큰으로 트리거합니다.
pub struct RelayServer {
    config: Arc<RelayConfig>,
    handler: Arc<FrameHandler>,
    cancel: CancellationToken,
}

/// 프레임 1개를 레코드로 바꾸고 webhook 요청을 생성하는 고정 파이프라인
///
/// 모든 연결 태스크가 공유합니다 (내부 가변 상태 없음).
struct FrameHandler {
    parser: RecordParser,
    rules: RuleSet,
    dispatcher: DispatcherHandle,
    /// 테스트 모드에서 프레임마다 무조건 호출할 webhook.
    /// 테스트 모드가 꺼져 있으면 None.
    test_webhook: Option<WebhookTarget>,
}

impl RelayServer {
    /// 새 서버를 생성합니다. 리스너 바인드는 [`run`](Self::run)에서 수행합니다.
    pub fn new(
        config: Arc<RelayConfig>,
        rules: RuleSet,
        dispatcher: DispatcherHandle,
        cancel: CancellationToken,
    ) -> Self {
        let test_webhook = if config.test_mode {
            config.test_webhook.clone()
        } else {
            None
        };
        Self {
            config,
            handler: Arc::new(FrameHandler {
                parser: RecordParser::new(),
                rules,
                dispatcher,
                test_webhook,
            }),
            cancel,
        }
    }

    /// 설정된 주소에 바인드하고 accept 루프를 시작합니다.
    pub async fn run(&self) -> Result<(), RelayError> {
        let addr = self.config.server.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| RelayError::Listener {
                reason: format!("failed to bind {addr}: {e}"),
            })?;
        info!(%addr, "syslog relay listening");
        self.serve(listener).await
    }

    /// 이미 바인드된 리스너로 accept 루프를 돕니다.
    ///
    /// 취소 토큰이 트리거되면 루프를 빠져나옵니다. 이미 수락된
    /// 연결의 태스크도 같은 토큰으로 종료됩니다.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), RelayError> {
        let limiter = Arc::new(Semaphore::new(self.config.server.max_connections));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    info!("relay server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    let Ok(permit) = Arc::clone(&limiter).try_acquire_owned() else {
                        warn!(%peer, "connection limit reached, rejecting");
                        drop(socket);
                        continue;
                    };

                    metrics::counter!(m::CONNECTIONS_TOTAL).increment(1);
                    info!(%peer, "connection accepted");

                    let handler = Arc::clone(&self.handler);
                    let cancel = self.cancel.clone();
                    tokio::spawn(async move {
                        handle_connection(socket, handler, cancel).await;
                        drop(permit);
                    });
                }
            }
        }
    }
}

/// 연결 1개의 수신 루프
///
/// 소켓에서 읽은 바이트를 버퍼에 누적하고, 완성된 프레임을
/// 순서대로 처리합니다. EOF, 소켓 에러, 프레이밍 에러, 셧다운
/// 중 어느 것이든 루프를 끝내면 연결이 닫힙니다.
async fn handle_connection(
    mut socket: TcpStream,
    handler: Arc<FrameHandler>,
    cancel: CancellationToken,
) {
    let peer = socket
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_owned());
    let framer = OctetCountFramer::new();
    let mut buf = BytesMut::with_capacity(READ_BUF_CAPACITY);

    loop {
        // 읽기 전에 버퍼의 완성된 프레임을 모두 소진
        loop {
            match framer.decode(&mut buf) {
                Ok(Some(frame)) => handler.handle(&frame),
                Ok(None) => break,
                Err(e) => {
                    metrics::counter!(m::FRAMING_ERRORS_TOTAL).increment(1);
                    warn!(%peer, error = %e, "framing error, closing connection");
                    return;
                }
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(%peer, "closing connection on shutdown");
                return;
            }
            read = socket.read_buf(&mut buf) => {
                match read {
                    Ok(0) => {
                        if !buf.is_empty() {
                            debug!(%peer, trailing = buf.len(), "peer closed with incomplete frame");
                        }
                        info!(%peer, "connection closed by peer");
                        return;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(%peer, error = %e, "socket read failed, closing connection");
                        return;
                    }
                }
            }
        }
    }
}

impl FrameHandler {
    /// 완성된 프레임 1개를 처리합니다.
    ///
    /// 빈 프레임(`"0 "`)은 keepalive로 간주하여 파싱과 디스패치를
    /// 모두 건너뜁니다.
    fn handle(&self, frame: &Bytes) {
        metrics::counter!(m::FRAMES_TOTAL).increment(1);
        if frame.is_empty() {
            debug!("skipping empty frame");
            return;
        }

        let record = self.parser.parse(frame);

        if let Some(parsed) = &record.structured {
            info!(
                hostname = parsed.hostname.as_deref().unwrap_or("-"),
                app = parsed.app_name.as_deref().unwrap_or("-"),
                msg = %parsed.msg,
                "received log"
            );
        }

        // 테스트 모드 디스패치는 규칙 디스패치에 추가로 발생하며,
        // MSG 필드가 아닌 프레임 원문 전체를 실어 보냄
        if let Some(hook) = &self.test_webhook {
            info!(raw = %record.raw_text, "test mode raw line");
            self.dispatcher.submit(DispatchRequest {
                target: hook.url.clone(),
                title: hook.title.clone(),
                msg: record.raw_text.clone(),
                url: hook.url_field.clone(),
            });
        }

        for request in self.rules.evaluate(&record) {
            self.dispatcher.submit(request);
        }
    }
}
