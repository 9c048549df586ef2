//! RedisStreamGateway - Redis Streams 上の StreamGateway
//!
//! | port               | command                                 |
//! |--------------------|-----------------------------------------|
//! | pending_summary    | `XPENDING key group`                    |
//! | pending_details    | `XPENDING key group start end count`    |
//! | claim              | `XCLAIM key group consumer min-idle id…` |
//! | write_index_record | `HSET key field value …`                |
//! | acknowledge        | `XACK key group id`                     |

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::streams::{StreamPendingCountReply, StreamPendingReply};
use redis::{
    AsyncCommands, ConnectionAddr, ConnectionInfo, ErrorKind, RedisConnectionInfo, RedisError,
    Value,
};
use tracing::{debug, info};

use crate::domain::{EntryId, Fields, IdRange, PendingRecord, PendingSummary, StreamEntry};
use crate::error::GatewayError;
use crate::ports::StreamGateway;

/// `REDIS_HOST` にポートがないときの既定値
pub const DEFAULT_PORT: u16 = 6379;

fn map_err(err: RedisError) -> GatewayError {
    if err.is_io_error()
        || err.is_connection_refusal()
        || err.is_connection_dropped()
        || err.is_timeout()
        || err.kind() == ErrorKind::AuthenticationFailed
    {
        GatewayError::Unavailable(err.to_string())
    } else {
        GatewayError::Command(err.to_string())
    }
}

fn parse_id(raw: &str) -> Result<EntryId, GatewayError> {
    raw.parse()
        .map_err(|e| GatewayError::Command(format!("unexpected reply: {e}")))
}

fn unexpected(what: &str, value: &Value) -> GatewayError {
    GatewayError::Command(format!("unexpected XCLAIM reply ({what}): {value:?}"))
}

/// 接続先を組み立てる。URL を経由しないのでパスワードのエスケープは不要。
///
/// `host` は `name`、`name:port`、`[v6addr]:port` のいずれか。ポート省略時は
/// [`DEFAULT_PORT`]。空のパスワードは「なし」として扱う。
pub fn connection_info(
    host: &str,
    password: Option<&str>,
    tls: bool,
) -> Result<ConnectionInfo, GatewayError> {
    let (name, port) = split_host(host)?;
    let addr = if tls {
        ConnectionAddr::TcpTls {
            host: name,
            port,
            insecure: false,
            tls_params: None,
        }
    } else {
        ConnectionAddr::Tcp(name, port)
    };
    Ok(ConnectionInfo {
        addr,
        redis: RedisConnectionInfo {
            password: password.filter(|p| !p.is_empty()).map(str::to_string),
            ..Default::default()
        },
    })
}

fn split_host(host: &str) -> Result<(String, u16), GatewayError> {
    let invalid = || GatewayError::Command(format!("invalid redis host `{host}`"));
    let trimmed = host.trim();
    let (name, port) = match trimmed.rsplit_once(':') {
        // 括弧なしの IPv6 アドレスはポートなしとみなす
        Some((name, port)) if !name.contains(':') || name.ends_with(']') => {
            (name, port.parse::<u16>().map_err(|_| invalid())?)
        }
        _ => (trimmed, DEFAULT_PORT),
    };
    let name = name.trim_start_matches('[').trim_end_matches(']');
    if name.is_empty() {
        return Err(invalid());
    }
    Ok((name.to_string(), port))
}

/// XCLAIM の応答をバイト列のまま読む。
///
/// 応答は `[[id, [field, value, ...]], ...]`。削除済みエントリは古いサーバーだと
/// `nil`（または `[id, nil]`）で返るので読み飛ばす。
fn parse_claim_reply(reply: Value) -> Result<Vec<StreamEntry>, GatewayError> {
    let items = match reply {
        Value::Array(items) => items,
        Value::Nil => return Ok(Vec::new()),
        other => return Err(unexpected("not an array", &other)),
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let parts = match item {
            Value::Array(parts) => parts,
            Value::Nil => continue,
            other => return Err(unexpected("entry", &other)),
        };
        let mut parts = parts.into_iter();
        let (Some(raw_id), Some(body)) = (parts.next(), parts.next()) else {
            return Err(GatewayError::Command(
                "unexpected XCLAIM reply: entry without id and fields".to_string(),
            ));
        };
        let raw_id = String::from_utf8(bulk_bytes(raw_id)?)
            .map_err(|_| GatewayError::Command("unexpected XCLAIM reply: id is not UTF-8".into()))?;
        let id = parse_id(&raw_id)?;

        let flat = match body {
            Value::Array(flat) => flat,
            Value::Nil => continue,
            other => return Err(unexpected("fields", &other)),
        };
        if flat.len() % 2 != 0 {
            return Err(GatewayError::Command(format!(
                "unexpected XCLAIM reply: odd field list for {id}"
            )));
        }
        let mut fields = Fields::new();
        let mut flat = flat.into_iter();
        while let (Some(name), Some(value)) = (flat.next(), flat.next()) {
            fields.insert(bulk_bytes(name)?, bulk_bytes(value)?);
        }
        entries.push(StreamEntry::new(id, fields));
    }
    Ok(entries)
}

fn bulk_bytes(value: Value) -> Result<Vec<u8>, GatewayError> {
    match value {
        Value::BulkString(bytes) => Ok(bytes),
        Value::SimpleString(text) => Ok(text.into_bytes()),
        other => Err(unexpected("bulk string", &other)),
    }
}

/// [`StreamGateway`] over a multiplexed, auto-reconnecting connection.
#[derive(Clone)]
pub struct RedisStreamGateway {
    conn: ConnectionManager,
}

impl RedisStreamGateway {
    /// 接続して `PING` で疎通を確認
    pub async fn connect(info: ConnectionInfo) -> Result<Self, GatewayError> {
        let client = redis::Client::open(info).map_err(map_err)?;
        let conn = ConnectionManager::new(client).await.map_err(map_err)?;
        let gateway = Self { conn };
        gateway.ping().await?;
        info!("connected to redis");
        Ok(gateway)
    }

    /// `PING` を送る
    pub async fn ping(&self) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        let _pong: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}

#[async_trait]
impl StreamGateway for RedisStreamGateway {
    async fn pending_summary(
        &self,
        stream: &str,
        group: &str,
    ) -> Result<PendingSummary, GatewayError> {
        let mut conn = self.conn.clone();
        let reply: StreamPendingReply = conn.xpending(stream, group).await.map_err(map_err)?;
        let count = match reply {
            StreamPendingReply::Empty => 0,
            StreamPendingReply::Data(data) => data.count,
        };
        Ok(PendingSummary { count })
    }

    async fn pending_details(
        &self,
        stream: &str,
        group: &str,
        range: IdRange,
        limit: usize,
    ) -> Result<Vec<PendingRecord>, GatewayError> {
        let mut conn = self.conn.clone();
        let reply: StreamPendingCountReply = conn
            .xpending_count(stream, group, range.start_arg(), range.end_arg(), limit)
            .await
            .map_err(map_err)?;

        reply
            .ids
            .into_iter()
            .map(|p| {
                Ok(PendingRecord {
                    id: parse_id(&p.id)?,
                    consumer: p.consumer,
                    idle: Duration::from_millis(p.last_delivered_ms as u64),
                    delivery_count: p.times_delivered as u64,
                })
            })
            .collect()
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> Result<Vec<StreamEntry>, GatewayError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let ids: Vec<String> = ids.iter().map(EntryId::to_string).collect();
        let min_idle_ms = u64::try_from(min_idle.as_millis()).unwrap_or(u64::MAX);
        let reply: Value = conn
            .xclaim(stream, group, consumer, min_idle_ms, ids.as_slice())
            .await
            .map_err(map_err)?;
        parse_claim_reply(reply)
    }

    async fn write_index_record(&self, key: &str, fields: &Fields) -> Result<(), GatewayError> {
        if fields.is_empty() {
            return Err(GatewayError::Command(format!(
                "refusing to write an empty record to {key}"
            )));
        }
        let mut conn = self.conn.clone();
        let mut cmd = redis::cmd("HSET");
        cmd.arg(key);
        for (name, value) in fields.iter() {
            cmd.arg(name).arg(value);
        }
        let _added: i64 = cmd.query_async(&mut conn).await.map_err(map_err)?;
        Ok(())
    }

    async fn acknowledge(
        &self,
        stream: &str,
        group: &str,
        id: EntryId,
    ) -> Result<(), GatewayError> {
        let mut conn = self.conn.clone();
        let raw_id = id.to_string();
        let acked: i64 = conn
            .xack(stream, group, std::slice::from_ref(&raw_id))
            .await
            .map_err(map_err)?;
        if acked == 0 {
            // 別の pass が先に ack 済み。pending からは消えているので成功扱い
            debug!(entry_id = %id, "entry was no longer pending at ack time");
        }
        Ok(())
    }
}
