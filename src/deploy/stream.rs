use super::DeployRequest;
use crate::{Error, Result};
use futures_util::{
    stream::{Stream, StreamExt},
    SinkExt,
};
use pin_project::pin_project;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio_tungstenite::tungstenite::Message as WSMessage;

/// Result of deploying one instance
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutcomeMessage {
    /// Instance id
    pub id: String,
    /// Instance name
    pub name: String,
    #[serde(rename = "nodename")]
    pub node: String,
    /// CPU shares allocated per core
    pub cpu: BTreeMap<String, i64>,
    /// Memory allocated in bytes
    pub memory: i64,
    pub success: bool,
    /// Set when `success` is false
    pub error: String,
    /// Network name to published address, set on success
    pub publish: BTreeMap<String, String>,
    /// Output of the after start hook, if one ran
    pub hook: String,
}

#[derive(Serialize)]
struct CreateWorkload<'a> {
    op: &'a str,
    #[serde(flatten)]
    request: &'a DeployRequest,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum AckResult {
    Ok,
    Error,
}

#[derive(Debug, Deserialize)]
struct Ack {
    result: AckResult,
    info: Option<String>,
}

async fn get_ok_response(ws: &mut crate::WebSocketStream) -> Result<()> {
    loop {
        let msg = ws
            .next()
            .await
            .ok_or_else(|| Error::Rpc(Some("Closed before acknowledging".to_string())))??;

        let data = match msg {
            WSMessage::Ping(_) | WSMessage::Pong(_) => continue,
            WSMessage::Binary(m) => m,
            WSMessage::Text(m) => m.into_bytes(),
            WSMessage::Close(_) => {
                return Err(Error::Rpc(Some("Closed before acknowledging".to_string())));
            }
            msg => return Err(Error::Rpc(Some(format!("Unexpected message type: '{msg}'")))),
        };

        let ack: Ack = serde_json::from_slice(&data)?;
        tracing::trace!("ack {:?}", ack);
        return match ack.result {
            AckResult::Ok => Ok(()),
            AckResult::Error => Err(Error::Rpc(ack.info)),
        };
    }
}

/// Per-instance outcomes of a deploy call, in arrival order.
///
/// Ends when the core closes the call. A read error or an undecodable frame
/// is yielded as an error and ends the stream.
#[derive(Debug)]
#[pin_project]
pub struct WorkloadStream {
    ws: crate::WebSocketStream,
    finished: bool,
}

impl WorkloadStream {
    #[tracing::instrument(skip_all, fields(app = %request.name, entrypoint = %request.entrypoint.name))]
    pub(crate) async fn open(client: &crate::Client, request: &DeployRequest) -> Result<Self> {
        let mut ws = client.open_websocket("deploy").await?;

        let cmd = CreateWorkload {
            op: "create-workload",
            request,
        };
        tracing::debug!("{}", serde_json::to_string_pretty(&cmd)?);

        ws.send(WSMessage::Binary(serde_json::to_vec(&cmd)?))
            .await?;

        get_ok_response(&mut ws).await?;
        tracing::debug!("Deploy request accepted");

        Ok(Self {
            ws,
            finished: false,
        })
    }

    /// Wait for the next outcome, `None` once the core has closed the call
    pub async fn recv(&mut self) -> Result<Option<OutcomeMessage>> {
        self.next().await.transpose()
    }
}

fn decode(data: &[u8]) -> Result<OutcomeMessage> {
    tracing::trace!("outcome: {}", String::from_utf8_lossy(data));
    Ok(serde_json::from_slice(data)?)
}

impl Stream for WorkloadStream {
    type Item = Result<OutcomeMessage>;

    fn poll_next(
        self: std::pin::Pin<&mut Self>,
        cx: &mut core::task::Context<'_>,
    ) -> core::task::Poll<Option<Self::Item>> {
        let this = self.project();

        if *this.finished {
            return core::task::Poll::Ready(None);
        }

        loop {
            let item = match std::task::ready!(core::pin::Pin::new(&mut *this.ws).poll_next(cx)) {
                Some(Ok(WSMessage::Ping(_) | WSMessage::Pong(_))) => continue,
                Some(Ok(WSMessage::Binary(m))) => Some(decode(&m)),
                Some(Ok(WSMessage::Text(m))) => Some(decode(m.as_bytes())),
                Some(Ok(WSMessage::Close(frame))) => {
                    tracing::debug!("Deploy stream closed {:?}", frame);
                    None
                }
                Some(Ok(msg)) => Some(Err(Error::Rpc(Some(format!(
                    "Unexpected message ({msg:?})"
                ))))),
                Some(Err(e)) => Some(Err(e.into())),
                None => None,
            };

            if !matches!(item, Some(Ok(_))) {
                *this.finished = true;
            }
            return core::task::Poll::Ready(item);
        }
    }
}
