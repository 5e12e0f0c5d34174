// SPDX-License-Identifier: Apache-2.0

//! Request handling for the query endpoint, independent of the HTTP server.

use std::collections::HashMap;
use std::sync::Arc;

use http::StatusCode;
use serde::Serialize;

use crate::capture::{PduStore, SubmitSm, TailProgress};
use crate::tail::FileId;

/// Status and serialized body of a handled request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub status: StatusCode,
    pub body: Option<Vec<u8>>,
}

impl Reply {
    fn json<T: Serialize>(value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Reply {
                status: StatusCode::OK,
                body: Some(body),
            },
            Err(e) => Reply::error(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("unable to serialize response: {}", e),
            ),
        }
    }

    fn error(status: StatusCode, message: impl Into<String>) -> Self {
        Reply {
            status,
            body: Some(message.into().into_bytes()),
        }
    }

    fn no_content() -> Self {
        Reply {
            status: StatusCode::NO_CONTENT,
            body: None,
        }
    }

    pub fn is_json(&self) -> bool {
        self.status == StatusCode::OK
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SearchParams {
    pub q: Option<String>,
    pub source: Option<String>,
    pub destination: Option<String>,
    pub text: Option<String>,
    pub limit: Option<usize>,
}

impl SearchParams {
    pub fn matches(&self, pdu: &SubmitSm) -> bool {
        self.q.as_deref().is_none_or(|q| pdu.contains(q))
            && self
                .source
                .as_deref()
                .is_none_or(|s| pdu.source_addr == s)
            && self
                .destination
                .as_deref()
                .is_none_or(|d| pdu.destination_addr == d)
            && self.text.as_deref().is_none_or(|t| pdu.message.contains(t))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    path: String,
    records: usize,
    offset: u64,
    file_id: FileId,
    head: String,
    tail: String,
}

struct Params(HashMap<String, String>);

impl Params {
    fn parse(query: Option<&str>) -> Self {
        let pairs = url::form_urlencoded::parse(query.unwrap_or_default().as_bytes())
            .into_owned()
            .filter(|(_, v)| !v.trim().is_empty())
            .collect();
        Params(pairs)
    }

    fn text(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }

    fn number<T: std::str::FromStr>(&self, key: &str) -> Result<Option<T>, Reply> {
        match self.0.get(key) {
            None => Ok(None),
            Some(raw) => raw.trim().parse().map(Some).map_err(|_| {
                Reply::error(
                    StatusCode::BAD_REQUEST,
                    format!("invalid value for {}: {:?}", key, raw),
                )
            }),
        }
    }
}

/// `GET /?id=N`
pub fn by_sequence(store: &PduStore, query: Option<&str>) -> Reply {
    let params = Params::parse(query);
    let id = match params.number::<u32>("id") {
        Ok(Some(id)) => id,
        Ok(None) => return Reply::error(StatusCode::BAD_REQUEST, "missing query parameter: id"),
        Err(reply) => return reply,
    };

    match store.find_by_sequence(id) {
        Some(pdu) => Reply::json(pdu.as_ref()),
        None => Reply::no_content(),
    }
}

/// `GET /list?offset=&limit=`
pub fn list(store: &PduStore, query: Option<&str>) -> Reply {
    let params = Params::parse(query);
    let (offset, limit) = match (
        params.number::<usize>("offset"),
        params.number::<usize>("limit"),
    ) {
        (Ok(offset), Ok(limit)) => (offset.unwrap_or(0), limit.unwrap_or(usize::MAX)),
        (Err(reply), _) | (_, Err(reply)) => return reply,
    };

    let records: Vec<Arc<SubmitSm>> = store
        .snapshot()
        .into_iter()
        .skip(offset)
        .take(limit)
        .collect();
    Reply::json(&records)
}

/// `GET /search?q=&source=&destination=&text=&limit=`
pub fn search(store: &PduStore, query: Option<&str>) -> Reply {
    let params = Params::parse(query);
    let limit = match params.number("limit") {
        Ok(limit) => limit,
        Err(reply) => return reply,
    };
    let search = SearchParams {
        q: params.text("q"),
        source: params.text("source"),
        destination: params.text("destination"),
        text: params.text("text"),
        limit,
    };

    let records: Vec<Arc<SubmitSm>> = store
        .snapshot()
        .into_iter()
        .filter(|pdu| search.matches(pdu))
        .take(search.limit.unwrap_or(usize::MAX))
        .collect();
    Reply::json(&records)
}

/// `GET /status`
pub fn status(store: &PduStore, progress: &TailProgress) -> Reply {
    let point = progress.snapshot();
    Reply::json(&StatusReport {
        path: progress.path().display().to_string(),
        records: store.len(),
        offset: point.offset,
        file_id: point.file_id,
        head: hex::encode(point.head),
        tail: hex::encode(point.tail),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tail::ResumePoint;
    use serde_json::Value;

    fn store() -> PduStore {
        let store = PduStore::new();
        for (seq, src, dst, msg) in [
            (1, "100", "200", "hello world"),
            (2, "100", "300", "your code is 4321"),
            (3, "101", "200", "Hello again"),
        ] {
            store.push(SubmitSm {
                command_id: 4,
                sequence_number: seq,
                source_addr: src.to_string(),
                destination_addr: dst.to_string(),
                short_message: msg.to_string(),
                message: msg.to_string(),
                ..Default::default()
            });
        }
        store
    }

    fn body(reply: &Reply) -> Value {
        serde_json::from_slice(reply.body.as_deref().unwrap()).unwrap()
    }

    fn sequences(reply: &Reply) -> Vec<u64> {
        body(reply)
            .as_array()
            .unwrap()
            .iter()
            .map(|r| r["sequenceNumber"].as_u64().unwrap())
            .collect()
    }

    #[test]
    fn test_by_sequence() {
        let store = store();

        let reply = by_sequence(&store, Some("id=2"));
        assert_eq!(reply.status, StatusCode::OK);
        assert_eq!(body(&reply)["message"], "your code is 4321");

        assert_eq!(
            by_sequence(&store, Some("id=9")).status,
            StatusCode::NO_CONTENT
        );
        assert_eq!(by_sequence(&store, None).status, StatusCode::BAD_REQUEST);
        assert_eq!(
            by_sequence(&store, Some("id=abc")).status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_list() {
        let store = store();

        assert_eq!(sequences(&list(&store, None)), vec![1, 2, 3]);
        assert_eq!(sequences(&list(&store, Some("offset=1"))), vec![2, 3]);
        assert_eq!(
            sequences(&list(&store, Some("offset=1&limit=1"))),
            vec![2]
        );
        assert_eq!(sequences(&list(&store, Some("limit="))), vec![1, 2, 3]);
        assert_eq!(
            list(&store, Some("limit=-1")).status,
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_search() {
        let store = store();

        assert_eq!(sequences(&search(&store, Some("q=hello"))), vec![1]);
        assert_eq!(sequences(&search(&store, Some("q=300"))), vec![2]);
        assert_eq!(sequences(&search(&store, Some("source=100"))), vec![1, 2]);
        assert_eq!(
            sequences(&search(&store, Some("destination=200&text=again"))),
            vec![3]
        );
        assert_eq!(
            sequences(&search(&store, Some("source=100&limit=1"))),
            vec![1]
        );
        assert_eq!(
            sequences(&search(&store, Some("q=your+code&source=+"))),
            vec![2]
        );
        assert!(sequences(&search(&store, Some("source=10"))).is_empty());
    }

    #[test]
    fn test_status() {
        let store = store();
        let progress = TailProgress::new("/tmp/capture.log");
        progress.publish(&ResumePoint {
            offset: 12,
            file_id: FileId::new(99),
            head: b"ab".to_vec(),
            tail: b"\n".to_vec(),
        });

        let json = body(&status(&store, &progress));
        assert_eq!(json["path"], "/tmp/capture.log");
        assert_eq!(json["records"], 3);
        assert_eq!(json["offset"], 12);
        assert_eq!(json["fileId"], 99);
        assert_eq!(json["head"], "6162");
        assert_eq!(json["tail"], "0a");
    }
}
