use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::{ConnectInfo, FromRequestParts},
    http::{HeaderMap, request::Parts},
};

use crate::{error::AppError, ledger::VoteRequest, state::State};

pub const FORWARDED_FOR: &str = "x-forwarded-for";
pub const UNKNOWN_VOTER: &str = "unknown";

/// Caller address used as the deduplication key.
pub struct Voter(pub String);

impl FromRequestParts<Arc<State>> for Voter {
    type Rejection = Infallible;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<State>,
    ) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(address)| *address);

        Ok(Voter(voter_address(
            &parts.headers,
            peer,
            state.config.trust_forwarded_for,
        )))
    }
}

pub fn voter_address(
    headers: &HeaderMap,
    peer: Option<SocketAddr>,
    trust_forwarded: bool,
) -> String {
    if trust_forwarded {
        let forwarded = headers
            .get(FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        if let Some(address) = forwarded {
            return address.to_string();
        }
    }

    peer.map(|address| address.ip().to_string())
        .unwrap_or_else(|| UNKNOWN_VOTER.to_string())
}

pub fn get_vote_request(body: &Bytes) -> Result<VoteRequest, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(VoteRequest::default());
    }

    serde_json::from_slice(body).map_err(|_| AppError::MalformedPayload)
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    fn peer() -> Option<SocketAddr> {
        Some("10.0.0.7:52000".parse().unwrap())
    }

    #[test]
    fn test_peer_address() {
        let headers = HeaderMap::new();

        assert_eq!(voter_address(&headers, peer(), false), "10.0.0.7");
        assert_eq!(voter_address(&headers, None, false), UNKNOWN_VOTER);
    }

    #[test]
    fn test_forwarded_for() {
        let mut headers = HeaderMap::new();
        headers.insert(FORWARDED_FOR, HeaderValue::from_static("203.0.113.9, 10.0.0.1"));

        assert_eq!(voter_address(&headers, peer(), true), "203.0.113.9");
        assert_eq!(voter_address(&headers, peer(), false), "10.0.0.7");

        headers.insert(FORWARDED_FOR, HeaderValue::from_static(" "));
        assert_eq!(voter_address(&headers, peer(), true), "10.0.0.7");
    }

    #[test]
    fn test_vote_request() {
        let request = get_vote_request(&Bytes::from_static(br#"{"candidateId": 4}"#)).unwrap();
        assert_eq!(request.candidate_id, Some(serde_json::json!(4)));

        let empty = get_vote_request(&Bytes::new()).unwrap();
        assert!(empty.candidate_id.is_none());

        assert!(matches!(
            get_vote_request(&Bytes::from_static(b"{not json")),
            Err(AppError::MalformedPayload)
        ));
    }
}
