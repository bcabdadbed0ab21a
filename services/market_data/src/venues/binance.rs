//! Binance kline stream and REST history
//!
//! ## Data Format Reference
//!
//! Stream `<symbol>@kline_1m`:
//! ```json
//! {"e":"kline","E":1700000000123,"s":"BTCUSDT",
//!  "k":{"t":1699999980000,"T":1700000039999,"i":"1m",
//!       "o":"37000.1","h":"37010.0","l":"36990.5","c":"37005.2","v":"12.5","x":false}}
//! ```
//!
//! REST `GET /api/v3/klines` returns arrays:
//! `[openTime, "open", "high", "low", "close", "volume", closeTime, ...]`

use crate::error::{MarketDataError, Result};
use crate::venue::{CandleStream, HistorySource, SymbolMapping, VenueFeed};
use async_trait::async_trait;
use futures::stream::{self, SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::Value;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use types::{Bar, CandleTick, Timeframe, VenueId};
use url::Url;

const VENUE: VenueId = VenueId::Binance;

/// Binance caps klines per request at 1000
pub const MAX_KLINES_PER_REQUEST: usize = 1000;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

#[derive(Debug, Deserialize)]
struct KlineEvent {
    #[serde(rename = "k")]
    kline: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(rename = "t")]
    open_time: i64,
    #[serde(rename = "o")]
    open: Option<String>,
    #[serde(rename = "h")]
    high: Option<String>,
    #[serde(rename = "l")]
    low: Option<String>,
    #[serde(rename = "c")]
    close: Option<String>,
    #[serde(rename = "v")]
    volume: Option<String>,
}

fn decimal(raw: Option<&str>) -> Option<Decimal> {
    raw.and_then(|s| Decimal::from_str(s).ok())
}

/// Parse a stream frame; `Ok(None)` for non-kline frames such as
/// subscription acknowledgements
pub fn parse_kline_event(text: &str) -> Result<Option<CandleTick>> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| MarketDataError::parse(VENUE, text, e))?;

    if value.get("e").and_then(Value::as_str) != Some("kline") {
        tracing::debug!("Ignoring non-kline Binance frame: {}", text);
        return Ok(None);
    }

    let event: KlineEvent =
        serde_json::from_value(value).map_err(|e| MarketDataError::parse(VENUE, text, e))?;
    let k = event.kline;
    Ok(Some(CandleTick {
        timestamp: k.open_time,
        open: decimal(k.open.as_deref()),
        high: decimal(k.high.as_deref()),
        low: decimal(k.low.as_deref()),
        close: decimal(k.close.as_deref()),
        volume: decimal(k.volume.as_deref()),
    }))
}

/// Parse one REST kline array into a bar aligned to `timeframe`
pub fn parse_kline_array(row: &[Value], timeframe: Timeframe) -> Option<Bar> {
    let open_time = row.first()?.as_i64()?;
    let field = |i: usize| decimal(row.get(i).and_then(Value::as_str));
    Some(Bar {
        timestamp: timeframe.bucket_start(open_time),
        open: field(1),
        high: field(2),
        low: field(3),
        close: field(4),
        volume: field(5),
    })
}

/// Websocket kline feed
#[derive(Debug, Clone)]
pub struct BinanceFeed {
    ws_url: String,
    connect_timeout: Duration,
}

impl BinanceFeed {
    pub fn new(ws_url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            ws_url: ws_url.into(),
            connect_timeout,
        }
    }

    fn stream_url(&self, symbol: &str) -> Result<Url> {
        let mut url = Url::parse(&self.ws_url)
            .map_err(|e| MarketDataError::Configuration(format!("invalid ws_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| MarketDataError::Configuration("ws_url cannot be a base".into()))?
            .pop_if_empty()
            .push(&format!("{}@kline_1m", symbol.to_ascii_lowercase()));
        Ok(url)
    }

    async fn connect(&self, url: &Url) -> Result<WsStream> {
        tracing::info!("Connecting to {} at {}", VENUE, url);
        match timeout(self.connect_timeout, connect_async(url.as_str())).await {
            Ok(Ok((ws, response))) => {
                tracing::info!(
                    "Connected to {} with response: {:?}",
                    VENUE,
                    response.status()
                );
                Ok(ws)
            }
            Ok(Err(e)) => Err(MarketDataError::ConnectionFailed {
                venue: VENUE,
                reason: e.to_string(),
            }),
            Err(_) => Err(MarketDataError::ConnectionTimeout {
                venue: VENUE,
                timeout_ms: self.connect_timeout.as_millis() as u64,
            }),
        }
    }
}

struct FeedState {
    write: SplitSink<WsStream, Message>,
    read: SplitStream<WsStream>,
    symbol: String,
}

impl FeedState {
    /// Next candle, answering pings along the way
    async fn next_tick(&mut self) -> Option<Result<CandleTick>> {
        loop {
            let message = match self.read.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(e.into())),
            };

            match message {
                Message::Text(text) => match parse_kline_event(&text) {
                    Ok(Some(tick)) => return Some(Ok(tick)),
                    Ok(None) => {}
                    Err(e) => tracing::warn!("Skipping {} frame for {}: {}", VENUE, self.symbol, e),
                },
                Message::Ping(data) => {
                    if let Err(e) = self.write.send(Message::Pong(data)).await {
                        return Some(Err(e.into()));
                    }
                }
                Message::Close(frame) => {
                    tracing::info!("{} websocket closed for {}: {:?}", VENUE, self.symbol, frame);
                    return Some(Err(MarketDataError::ConnectionClosed {
                        venue: VENUE,
                        reason: frame.map(|f| f.reason.to_string()),
                    }));
                }
                Message::Binary(data) => {
                    tracing::warn!("Unexpected binary message from {}: {} bytes", VENUE, data.len());
                }
                Message::Pong(_) | Message::Frame(_) => {}
            }
        }
    }
}

#[async_trait]
impl VenueFeed for BinanceFeed {
    fn venue(&self) -> VenueId {
        VENUE
    }

    async fn subscribe(&self, symbol: &str) -> Result<CandleStream> {
        let url = self.stream_url(symbol)?;
        let (write, read) = self.connect(&url).await?.split();

        let state = FeedState {
            write,
            read,
            symbol: symbol.to_string(),
        };

        // an Err ends the stream; the engine reconnects
        let stream = stream::unfold(Some(state), |state| async move {
            let mut state = state?;
            match state.next_tick().await? {
                Ok(tick) => Some((Ok(tick), Some(state))),
                Err(e) => Some((Err(e), None)),
            }
        });
        Ok(stream.boxed())
    }
}

/// REST klines and exchange metadata
#[derive(Debug, Clone)]
pub struct BinanceHistory {
    client: reqwest::Client,
    rest_url: String,
}

impl BinanceHistory {
    pub fn new(rest_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), rest_url)
    }

    pub fn with_client(client: reqwest::Client, rest_url: impl Into<String>) -> Self {
        Self {
            client,
            rest_url: rest_url.into().trim_end_matches('/').to_string(),
        }
    }

    async fn get_json(&self, path: &str, query: &[(&str, String)]) -> Result<Value> {
        let url = format!("{}{}", self.rest_url, path);
        let response = self
            .client
            .get(&url)
            .query(query)
            .send()
            .await
            .map_err(|e| MarketDataError::Http {
                venue: VENUE,
                reason: e.to_string(),
            })?;

        let status = response.status();
        // 418 is Binance's escalation after ignored 429s
        if status.as_u16() == 429 || status.as_u16() == 418 {
            return Err(MarketDataError::RateLimited { venue: VENUE });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MarketDataError::Http {
                venue: VENUE,
                reason: format!("{} {}: {}", status, path, body),
            });
        }

        response.json().await.map_err(|e| MarketDataError::Http {
            venue: VENUE,
            reason: format!("invalid JSON from {}: {}", path, e),
        })
    }
}

#[async_trait]
impl HistorySource for BinanceHistory {
    fn venue(&self) -> VenueId {
        VENUE
    }

    async fn fetch(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        since_ms: i64,
        limit: usize,
    ) -> Result<Vec<Bar>> {
        let limit = limit.clamp(1, MAX_KLINES_PER_REQUEST);
        let body = self
            .get_json(
                "/api/v3/klines",
                &[
                    ("symbol", symbol.to_string()),
                    ("interval", timeframe.label().to_string()),
                    ("startTime", since_ms.to_string()),
                    ("limit", limit.to_string()),
                ],
            )
            .await?;

        let rows = body
            .as_array()
            .ok_or_else(|| MarketDataError::parse(VENUE, body.to_string(), "klines is not an array"))?;

        Ok(rows
            .iter()
            .filter_map(|row| row.as_array())
            .filter_map(|row| parse_kline_array(row, timeframe))
            .collect())
    }

    async fn symbols(&self) -> Result<Vec<SymbolMapping>> {
        let body = self.get_json("/api/v3/exchangeInfo", &[]).await?;
        Ok(parse_exchange_info(&body))
    }
}

/// Trading symbols from an `exchangeInfo` response
pub fn parse_exchange_info(body: &Value) -> Vec<SymbolMapping> {
    body.get("symbols")
        .and_then(Value::as_array)
        .map(|symbols| {
            symbols
                .iter()
                .filter(|s| s.get("status").and_then(Value::as_str) == Some("TRADING"))
                .filter_map(|s| {
                    let venue_symbol = s.get("symbol")?.as_str()?;
                    let base = s.get("baseAsset")?.as_str()?;
                    let quote = s.get("quoteAsset")?.as_str()?;
                    Some(SymbolMapping {
                        logical: format!("{base}/{quote}"),
                        venue_symbol: venue_symbol.to_string(),
                    })
                })
                .collect()
        })
        .unwrap_or_default()
}
