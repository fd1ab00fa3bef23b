// Tests for the chat completion summarizer

#[cfg(test)]
mod request_tests {
    use crate::{ChatSummarizer, ChatSummarizerConfig, MessageRole, DEFAULT_SYSTEM_PROMPT};

    #[test]
    fn test_azure_url_and_request() {
        let summarizer = ChatSummarizer::new(ChatSummarizerConfig::azure(
            "https://res.openai.azure.com/",
            "key",
            "gpt-4o",
        ));
        assert_eq!(
            summarizer.api_url(),
            "https://res.openai.azure.com/openai/deployments/gpt-4o/chat/completions?api-version=2024-02-01"
        );

        let request = summarizer.build_request("Hello World");
        assert!(request.model.is_none());
        assert_eq!(request.messages.len(), 2);
        assert_eq!(request.messages[0].role, MessageRole::System);
        assert_eq!(request.messages[0].content, DEFAULT_SYSTEM_PROMPT);
        assert_eq!(request.messages[1].role, MessageRole::User);
        assert!(request.messages[1].content.ends_with("Hello World"));
    }

    #[test]
    fn test_openai_request_names_model() {
        let summarizer = ChatSummarizer::new(
            ChatSummarizerConfig::openai("key", "gpt-4o-mini").with_max_tokens(256),
        );
        let body = serde_json::to_value(summarizer.build_request("text")).unwrap();
        assert_eq!(body["model"], "gpt-4o-mini");
        assert_eq!(body["max_tokens"], 256);
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn test_debug_redacts_key() {
        let summarizer =
            ChatSummarizer::new(ChatSummarizerConfig::azure("https://x", "hunter2", "d"));
        let rendered = format!("{:?}", summarizer);
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("[REDACTED]"));
    }
}

#[cfg(test)]
mod http_tests {
    use crate::{ChatSummarizer, ChatSummarizerConfig, SummarizeError, Summarizer};
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn completion(content: &str) -> serde_json::Value {
        json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": content},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 20, "completion_tokens": 5, "total_tokens": 25}
        })
    }

    #[tokio::test]
    async fn test_azure_summary() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/summaries/chat/completions"))
            .and(query_param("api-version", "2024-02-01"))
            .and(header("api-key", "azure-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("A short greeting.")))
            .expect(1)
            .mount(&server)
            .await;

        let summarizer = ChatSummarizer::new(ChatSummarizerConfig::azure(
            server.uri(),
            "azure-key",
            "summaries",
        ));
        let summary = summarizer.summarize("Hello World").await.unwrap();
        assert_eq!(summary.content, "A short greeting.");

        let requests = server.received_requests().await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "You are a helpful assistant.");
        assert_eq!(body["messages"][1]["role"], "user");
        assert!(body.get("model").is_none());
    }

    #[tokio::test]
    async fn test_openai_compatible_uses_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(completion("Summary.")))
            .mount(&server)
            .await;

        let summarizer = ChatSummarizer::new(ChatSummarizerConfig::openai_compatible(
            format!("{}/v1/chat/completions", server.uri()),
            "sk-test",
            "gpt-4o-mini",
        ));
        assert_eq!(summarizer.summarize("text").await.unwrap().content, "Summary.");
    }

    #[tokio::test]
    async fn test_error_status_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let summarizer =
            ChatSummarizer::new(ChatSummarizerConfig::azure(server.uri(), "k", "d"));
        let err = summarizer.summarize("text").await.unwrap_err();
        assert!(matches!(err, SummarizeError::Service { status: 429, .. }));
    }

    #[tokio::test]
    async fn test_empty_choices_is_empty_response() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .mount(&server)
            .await;

        let summarizer =
            ChatSummarizer::new(ChatSummarizerConfig::azure(server.uri(), "k", "d"));
        let err = summarizer.summarize("text").await.unwrap_err();
        assert!(matches!(err, SummarizeError::EmptyResponse));
    }
}
