//! Legacy HMAC signature verification over HTTP.

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::join_all;
    use messagebird_signature::legacy::{RequestValidator, SIGNATURE_HEADER, TIMESTAMP_HEADER};

    use crate::{client, spawn_server};

    const KEY: &str = "PlLrKaqvZNRR5zAjm42ZT6q1SQxgbbGd";

    async fn server() -> String {
        let addr = spawn_server(|_| {
            RequestValidator::new(KEY).with_max_validity(Duration::from_secs(3600))
        })
        .await;
        format!("http://{addr}")
    }

    fn now() -> String {
        chrono::Utc::now().timestamp().to_string()
    }

    fn sign(timestamp: &str, query: &str, body: &[u8]) -> String {
        RequestValidator::new(KEY).sign(timestamp, query, body).unwrap()
    }

    #[tokio::test]
    async fn test_should_forward_signed_request_with_body_intact() {
        let base = server().await;
        let timestamp = now();
        let body = br#"{"a key":"some value"}"#;
        let signature = sign(&timestamp, "def=bar&abc=foo", body);

        let resp = client()
            .post(format!("{base}/webhook?def=bar&abc=foo"))
            .header(TIMESTAMP_HEADER, &timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body(body.to_vec())
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.bytes().await.unwrap().as_ref(), body);
    }

    #[tokio::test]
    async fn test_should_accept_reordered_query_on_the_wire() {
        let base = server().await;
        let timestamp = now();
        let signature = sign(&timestamp, "abc=foo&def=bar", b"");

        let resp = client()
            .get(format!("{base}/webhook?def=bar&abc=foo"))
            .header(TIMESTAMP_HEADER, &timestamp)
            .header(SIGNATURE_HEADER, signature)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::OK);
    }

    #[tokio::test]
    async fn test_should_reject_missing_headers_with_empty_401() {
        let base = server().await;
        let timestamp = now();
        let signature = sign(&timestamp, "", b"{}");

        let without_timestamp = client()
            .post(format!("{base}/webhook"))
            .header(SIGNATURE_HEADER, &signature)
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(without_timestamp.status(), reqwest::StatusCode::UNAUTHORIZED);
        assert!(without_timestamp.bytes().await.unwrap().is_empty());

        let without_signature = client()
            .post(format!("{base}/webhook"))
            .header(TIMESTAMP_HEADER, &timestamp)
            .body("{}")
            .send()
            .await
            .unwrap();
        assert_eq!(without_signature.status(), reqwest::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_should_reject_stale_timestamp() {
        let base = server().await;
        let timestamp = (chrono::Utc::now().timestamp() - 2 * 3600).to_string();
        let signature = sign(&timestamp, "", b"{}");

        let resp = client()
            .post(format!("{base}/webhook"))
            .header(TIMESTAMP_HEADER, &timestamp)
            .header(SIGNATURE_HEADER, signature)
            .body("{}")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_should_verify_parallel_requests_independently() {
        let base = server().await;
        let client = client();

        let requests = (0..32).map(|i| {
            let client = client.clone();
            let base = base.clone();
            async move {
                let timestamp = now();
                let query = format!("n={i}");
                let body = format!(r#"{{"n":{i}}}"#);
                let signature = sign(&timestamp, &query, body.as_bytes());
                let sent_query = if i % 2 == 0 { query } else { format!("n={}", i + 1) };

                let resp = client
                    .post(format!("{base}/webhook?{sent_query}"))
                    .header(TIMESTAMP_HEADER, &timestamp)
                    .header(SIGNATURE_HEADER, signature)
                    .body(body.clone())
                    .send()
                    .await
                    .unwrap();
                let status = resp.status();
                let echoed = resp.bytes().await.unwrap();
                (i, status, echoed, body)
            }
        });

        for (i, status, echoed, body) in join_all(requests).await {
            if i % 2 == 0 {
                assert_eq!(status, reqwest::StatusCode::OK, "request {i}");
                assert_eq!(echoed.as_ref(), body.as_bytes(), "request {i}");
            } else {
                assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED, "request {i}");
                assert!(echoed.is_empty(), "request {i}");
            }
        }
    }
}
