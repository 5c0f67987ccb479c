//! JWT signature verification over HTTP.

#[cfg(test)]
mod tests {
    use futures::future::join_all;
    use messagebird_signature::jwt::{SIGNATURE_HEADER, Signer, Validator, resolve_url};

    use crate::{client, spawn_server};

    const KEY: &str = "integration-jwt-key";

    async fn server() -> String {
        let addr =
            spawn_server(|addr| Validator::new(KEY).for_base_url(format!("http://{addr}"))).await;
        format!("http://{addr}")
    }

    fn token_for(base: &str, target: &str, body: &[u8]) -> String {
        let url = resolve_url(base, target).unwrap().unwrap();
        Signer::new(KEY).sign(Some(&url), body).unwrap()
    }

    #[tokio::test]
    async fn test_should_forward_signed_request_with_body_intact() {
        let base = server().await;
        let body = br#"{"id":"e8077d803532c0b5937c639b60216938","status":"delivered"}"#;
        let token = token_for(&base, "/webhook?b=2&a=1", body);

        let resp = client()
            .post(format!("{base}/webhook?b=2&a=1"))
            .header(SIGNATURE_HEADER, token)
            .body(body.to_vec())
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::OK);
        assert_eq!(resp.bytes().await.unwrap().as_ref(), body);
    }

    #[tokio::test]
    async fn test_should_reject_missing_header_with_empty_401() {
        let base = server().await;

        let resp = client()
            .post(format!("{base}/webhook"))
            .body("{}")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
        assert!(resp.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_reject_request_to_other_url() {
        let base = server().await;
        let token = token_for(&base, "/webhook?id=1", b"{}");

        let resp = client()
            .post(format!("{base}/webhook?id=2"))
            .header(SIGNATURE_HEADER, token)
            .body("{}")
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_should_reject_tampered_body() {
        let base = server().await;
        let token = token_for(&base, "/webhook", br#"{"amount":1}"#);

        let resp = client()
            .post(format!("{base}/webhook"))
            .header(SIGNATURE_HEADER, token)
            .body(r#"{"amount":100}"#)
            .send()
            .await
            .unwrap();

        assert_eq!(resp.status(), reqwest::StatusCode::UNAUTHORIZED);
        assert!(resp.bytes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_should_verify_parallel_requests_independently() {
        let base = server().await;
        let client = client();

        let requests = (0..32).map(|i| {
            let client = client.clone();
            let base = base.clone();
            async move {
                let target = format!("/webhook?n={i}");
                let body = format!(r#"{{"n":{i}}}"#);
                let token = token_for(&base, &target, body.as_bytes());
                let sent = if i % 2 == 0 { body } else { format!(r#"{{"n":{}}}"#, i + 1) };

                let resp = client
                    .post(format!("{base}{target}"))
                    .header(SIGNATURE_HEADER, token)
                    .body(sent.clone())
                    .send()
                    .await
                    .unwrap();
                let status = resp.status();
                let echoed = resp.bytes().await.unwrap();
                (i, status, echoed, sent)
            }
        });

        for (i, status, echoed, sent) in join_all(requests).await {
            if i % 2 == 0 {
                assert_eq!(status, reqwest::StatusCode::OK, "request {i}");
                assert_eq!(echoed.as_ref(), sent.as_bytes(), "request {i}");
            } else {
                assert_eq!(status, reqwest::StatusCode::UNAUTHORIZED, "request {i}");
                assert!(echoed.is_empty(), "request {i}");
            }
        }
    }
}
