//! JSON-RPC `eth_getLogs` request/response handling for one fetch-pool slot. Grounded
//! on `original_source/upstream.c`'s request body construction and the capped-buffer
//! response handling its `req_t` performs with libcurl write callbacks.

use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Address, LogRecord, Topic};

/// Response bodies larger than this fail the request (§4.7).
const MAX_RESPONSE_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Serialize)]
struct RpcRequest<'a> {
    id: u64,
    jsonrpc: &'a str,
    method: &'a str,
    params: [RpcParams; 1],
}

#[derive(Serialize)]
struct RpcParams {
    #[serde(rename = "fromBlock")]
    from_block: String,
    #[serde(rename = "toBlock")]
    to_block: String,
}

#[derive(Deserialize)]
struct RpcResponse {
    id: u64,
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    result: Option<Vec<RpcLog>>,
}

#[derive(Deserialize)]
struct RpcLog {
    #[serde(rename = "blockNumber")]
    block_number: String,
    address: String,
    #[serde(default)]
    topics: Vec<String>,
}

/// Issues one `eth_getLogs` request for the inclusive block range `[from, to]` and
/// returns its decoded, block-ascending-sorted batch. `to = from + BATCH` per §4.7; the
/// caller picks `BATCH`.
pub fn fetch_logs(
    client: &reqwest::blocking::Client,
    url: &str,
    request_id: u64,
    from: u64,
    to: u64,
) -> Result<Vec<LogRecord>> {
    let body = RpcRequest {
        id: request_id,
        jsonrpc: "2.0",
        method: "eth_getLogs",
        params: [RpcParams {
            from_block: format!("0x{from:x}"),
            to_block: format!("0x{to:x}"),
        }],
    };

    let response = client
        .post(url)
        .json(&body)
        .send()
        .map_err(|err| Error::NodeRequestError(err.to_string()))?;

    let status = response.status();
    if !status.is_success() {
        return Err(Error::NodeRequestError(format!("upstream returned status {status}")));
    }

    let bytes = read_capped(response, MAX_RESPONSE_BYTES)?;

    let parsed: RpcResponse = serde_json::from_slice(&bytes)
        .map_err(|err| Error::NodeRequestError(format!("malformed JSON-RPC response: {err}")))?;

    if parsed.id != request_id {
        return Err(Error::NodeRequestError(format!(
            "response id {} does not match request id {request_id}",
            parsed.id
        )));
    }
    if let Some(error) = parsed.error {
        return Err(Error::NodeRequestError(format!("upstream returned an error object: {error}")));
    }
    let raw_logs = parsed
        .result
        .ok_or_else(|| Error::NodeRequestError("response is missing result array".into()))?;

    let mut records = raw_logs
        .into_iter()
        .map(decode_log)
        .collect::<Result<Vec<_>>>()?;
    records.sort_by_key(|record| record.block_number);
    Ok(records)
}

fn read_capped(mut response: reqwest::blocking::Response, cap: u64) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let read = response
        .by_ref()
        .take(cap + 1)
        .read_to_end(&mut buffer)
        .map_err(|err| Error::NodeRequestError(format!("failed reading response body: {err}")))?;
    if read as u64 > cap {
        return Err(Error::NodeRequestError(format!(
            "response body exceeds the {cap}-byte cap"
        )));
    }
    Ok(buffer)
}

fn decode_log(raw: RpcLog) -> Result<LogRecord> {
    let block_number = parse_hex_u64(&raw.block_number)?;
    let address: Address = decode_fixed_hex(&raw.address)?;

    if raw.topics.len() > 4 {
        return Err(Error::NodeRequestError(format!(
            "log carries {} topics, at most 4 are supported",
            raw.topics.len()
        )));
    }
    let mut topics: [Topic; 4] = [[0u8; 32]; 4];
    for (slot, hex_topic) in topics.iter_mut().zip(raw.topics.iter()) {
        *slot = decode_fixed_hex(hex_topic)?;
    }

    Ok(LogRecord {
        block_number,
        address,
        topics,
    })
}

fn parse_hex_u64(s: &str) -> Result<u64> {
    let trimmed = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    u64::from_str_radix(trimmed, 16)
        .map_err(|err| Error::NodeRequestError(format!("invalid hex integer {s:?}: {err}")))
}

fn decode_fixed_hex<const N: usize>(s: &str) -> Result<[u8; N]> {
    let trimmed = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
    let bytes = hex::decode(trimmed)
        .map_err(|err| Error::NodeRequestError(format!("invalid hex bytes {s:?}: {err}")))?;
    bytes
        .try_into()
        .map_err(|bytes: Vec<u8>| Error::NodeRequestError(format!("expected {N} bytes, got {}", bytes.len())))
}
