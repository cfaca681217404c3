#[cfg(test)]
mod tests {
    use crate::config::{BackendKind, DataSourceOptions, InMemoryConfigStore, InstanceSettings};
    use crate::datasource::{DataSource, SdsDataSource, TestResult};
    use crate::error::{Result, SdsError};
    use crate::frame::{ColumnValues, FieldType};
    use crate::http::{HttpClient, HttpRequest, HttpResponse};
    use crate::query::{QueryRequest, QueryTarget, StreamOption, StreamReference, TimeRange};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use mockall::predicate::*;
    use mockall::*;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Barrier;

    mock! {
        pub HttpClient {}
        #[async_trait]
        impl HttpClient for HttpClient {
            async fn request(&self, request: HttpRequest) -> Result<HttpResponse>;
        }
    }

    const FROM: &str = "2020-01-01T00:00:00Z";
    const TO: &str = "2020-01-02T00:00:00Z";

    fn settings(kind: BackendKind, namespace: &str, community: bool) -> InstanceSettings {
        InstanceSettings {
            name: "sds".to_string(),
            url: None,
            json_data: DataSourceOptions {
                kind: Some(kind),
                eds_port: Some("PORT".to_string()),
                ocs_url: Some("URL".to_string()),
                ocs_version: Some("VERSION".to_string()),
                ocs_tenant: Some("TENANT".to_string()),
                ocs_client: Some("CLIENT".to_string()),
                oauth_pass_thru: Some(false),
                namespace: Some(namespace.to_string()),
                ocs_use_community: Some(community),
                ocs_community: Some("COMMUNITY".to_string()),
            },
            ..Default::default()
        }
    }

    fn ocs_settings() -> InstanceSettings {
        settings(BackendKind::Ocs, "NAMESPACE", false)
    }

    fn range() -> TimeRange {
        TimeRange::new(
            Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2020, 1, 2, 0, 0, 0).unwrap(),
        )
    }

    fn target(ref_id: &str, stream_id: &str) -> QueryTarget {
        QueryTarget::new(
            ref_id,
            StreamReference {
                id: stream_id.to_string(),
                name: stream_id.to_string(),
            },
        )
    }

    fn datasource(settings: &InstanceSettings, client: MockHttpClient) -> SdsDataSource {
        SdsDataSource::new(settings, Arc::new(client))
    }

    #[tokio::test]
    async fn test_query_with_expected_parameters() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_request()
            .with(eq(HttpRequest::get(format!(
                "/ocs/api/VERSION/tenants/TENANT/namespaces/NAMESPACE/streams/STREAM/data?startIndex={}&endIndex={}",
                FROM, TO
            ))))
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::ok(json!([
                    { "TimeStamp": "2020-01-01", "Boolean": true, "Number": 1, "String": "A" }
                ])))
            });

        let datasource = datasource(&ocs_settings(), mock_http);
        let request = QueryRequest::new(range(), vec![target("REFID", "STREAM")]);
        let response = datasource.query(&request).await;

        assert_eq!(response.data.len(), 1);
        let table = &response.data[0];
        assert_eq!(table.ref_id.as_deref(), Some("REFID"));
        assert_eq!(table.name.as_deref(), Some("STREAM"));
        assert_eq!(table.error, None);

        let types: Vec<_> = table.columns.iter().map(|c| c.field_type()).collect();
        assert_eq!(
            types,
            vec![FieldType::Time, FieldType::Boolean, FieldType::Number, FieldType::Text]
        );
        assert_eq!(table.columns[0].values, ColumnValues::Time(vec![Some(1_577_836_800_000)]));
        assert_eq!(table.columns[1].values, ColumnValues::Boolean(vec![Some(true)]));
        assert_eq!(table.columns[2].values, ColumnValues::Number(vec![Some(1.0)]));
        assert_eq!(table.columns[3].values, ColumnValues::Text(vec![Some("A".to_string())]));
    }

    #[tokio::test]
    async fn test_target_without_stream_issues_no_request() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_request()
            .times(1)
            .returning(|_| Ok(HttpResponse::ok(json!([{ "Value": 1 }]))));

        let datasource = datasource(&ocs_settings(), mock_http);
        let request = QueryRequest::new(range(), vec![target("A", ""), target("B", "STREAM"), target("C", "")]);
        let response = datasource.query(&request).await;

        assert_eq!(response.data.len(), 3);
        assert!(response.data[0].is_empty());
        assert_eq!(response.data[0].ref_id.as_deref(), Some("A"));
        assert!(!response.data[1].is_empty());
        assert_eq!(response.data[1].ref_id.as_deref(), Some("B"));
        assert!(response.data[2].is_empty());
    }

    #[tokio::test]
    async fn test_empty_body_yields_empty_table() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_request().times(2).returning(|request| {
            if request.url.contains("/EMPTY/") {
                Ok(HttpResponse::ok(json!([])))
            } else {
                Ok(HttpResponse {
                    status: 204,
                    status_text: "No Content".to_string(),
                    body: None,
                })
            }
        });

        let datasource = datasource(&ocs_settings(), mock_http);
        let request = QueryRequest::new(range(), vec![target("A", "EMPTY"), target("B", "NONE")]);
        let response = datasource.query(&request).await;

        assert!(response.data.iter().all(|t| t.is_empty() && t.error.is_none()));
    }

    #[tokio::test]
    async fn test_failed_target_does_not_fail_batch() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_request().times(3).returning(|request| {
            if request.url.contains("/DOWN/") {
                Err(SdsError::Transport("connection refused".to_string()))
            } else if request.url.contains("/MISSING/") {
                Ok(HttpResponse {
                    status: 404,
                    status_text: "Not Found".to_string(),
                    body: None,
                })
            } else {
                Ok(HttpResponse::ok(json!([{ "Value": 1 }])))
            }
        });

        let datasource = datasource(&ocs_settings(), mock_http);
        let request = QueryRequest::new(
            range(),
            vec![target("A", "DOWN"), target("B", "MISSING"), target("C", "OK")],
        );
        let response = datasource.query(&request).await;

        assert!(response.data[0].error.as_ref().unwrap().contains("connection refused"));
        assert_eq!(response.data[1].error.as_deref(), Some("404: Not Found"));
        assert_eq!(response.data[2].error, None);
        assert_eq!(response.data[2].row_count(), 1);
    }

    #[tokio::test]
    async fn test_community_query_uses_stream_path() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_request()
            .with(eq(HttpRequest::get(format!(
                "/ocs/streampath/data?startIndex={}&endIndex={}",
                FROM, TO
            ))))
            .times(1)
            .returning(|_| Ok(HttpResponse::ok(json!([]))));

        let datasource = datasource(&settings(BackendKind::Ocs, "", true), mock_http);
        let request = QueryRequest::new(range(), vec![target("A", "https://host/streampath")]);
        let response = datasource.query(&request).await;
        assert!(response.data[0].is_empty());
    }

    #[tokio::test]
    async fn test_community_query_with_invalid_path() {
        let mock_http = MockHttpClient::new();
        let datasource = datasource(&settings(BackendKind::Ocs, "", true), mock_http);
        let request = QueryRequest::new(range(), vec![target("A", "streampath")]);
        let response = datasource.query(&request).await;
        assert!(response.data[0].error.is_some());
    }

    #[tokio::test]
    async fn test_eds_query_url() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_request()
            .with(eq(HttpRequest::get(format!(
                "http://localhost:PORT/api/v1/tenants/default/namespaces/default/streams/S/data?startIndex={}&endIndex={}",
                FROM, TO
            ))))
            .times(1)
            .returning(|_| Ok(HttpResponse::ok(json!([]))));

        let datasource = datasource(&settings(BackendKind::Eds, "default", true), mock_http);
        datasource
            .query(&QueryRequest::new(range(), vec![target("A", "S")]))
            .await;
    }

    /// Answers slower for earlier streams so responses settle in reverse order.
    struct DelayedClient;

    #[async_trait]
    impl HttpClient for DelayedClient {
        async fn request(&self, request: HttpRequest) -> Result<HttpResponse> {
            let delay = if request.url.contains("/FIRST/") { 50 } else { 5 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let stream = if request.url.contains("/FIRST/") { "first" } else { "second" };
            Ok(HttpResponse::ok(json!([{ "Stream": stream }])))
        }
    }

    #[tokio::test]
    async fn test_output_follows_target_order() {
        let datasource = SdsDataSource::new(&ocs_settings(), Arc::new(DelayedClient));
        let request = QueryRequest::new(range(), vec![target("A", "FIRST"), target("B", "SECOND")]);
        let response = datasource.query(&request).await;

        assert_eq!(response.data[0].ref_id.as_deref(), Some("A"));
        assert_eq!(
            response.data[0].columns[0].values,
            ColumnValues::Text(vec![Some("first".to_string())])
        );
        assert_eq!(response.data[1].ref_id.as_deref(), Some("B"));
        assert_eq!(
            response.data[1].columns[0].values,
            ColumnValues::Text(vec![Some("second".to_string())])
        );
    }

    /// Only answers once every request of the batch is in flight.
    struct GatedClient {
        barrier: Barrier,
    }

    #[async_trait]
    impl HttpClient for GatedClient {
        async fn request(&self, _request: HttpRequest) -> Result<HttpResponse> {
            self.barrier.wait().await;
            Ok(HttpResponse::ok(json!([])))
        }
    }

    #[tokio::test]
    async fn test_requests_are_dispatched_concurrently() {
        let client = Arc::new(GatedClient {
            barrier: Barrier::new(3),
        });
        let datasource = SdsDataSource::new(&ocs_settings(), client);
        let request = QueryRequest::new(
            range(),
            vec![target("A", "S1"), target("B", "S2"), target("C", "S3")],
        );

        let response = tokio::time::timeout(Duration::from_secs(5), datasource.query(&request))
            .await
            .expect("requests were not issued concurrently");
        assert_eq!(response.data.len(), 3);
    }

    #[tokio::test]
    async fn test_search_streams_without_namespace() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_request().never();

        let datasource = datasource(&settings(BackendKind::Ocs, "", false), mock_http);
        let result = datasource.search_streams("").await;
        assert_eq!(result.unwrap(), Vec::<StreamOption>::new());
    }

    #[tokio::test]
    async fn test_search_streams() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_request()
            .with(eq(HttpRequest::get(
                "/ocs/api/VERSION/tenants/TENANT/namespaces/NAMESPACE/streams?query=*test*",
            )))
            .times(1)
            .returning(|_| Ok(HttpResponse::ok(json!([{ "Id": "Stream" }]))));

        let datasource = datasource(&ocs_settings(), mock_http);
        let result = datasource.search_streams("test").await.unwrap();
        assert_eq!(
            result,
            vec![StreamOption {
                value: "Stream".to_string(),
                label: "Stream".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_search_streams_without_text() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_request()
            .with(eq(HttpRequest::get(
                "/ocs/api/VERSION/tenants/TENANT/namespaces/NAMESPACE/streams",
            )))
            .times(1)
            .returning(|_| Ok(HttpResponse::ok(json!([{ "Id": "Stream" }, { "Name": "no id" }]))));

        let datasource = datasource(&ocs_settings(), mock_http);
        let result = datasource.search_streams("").await.unwrap();
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn test_search_community_streams() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_request()
            .with(eq(HttpRequest::get(
                "/ocs/api/VERSION/tenants/TENANT/search/communities/COMMUNITY/streams?query=*test*",
            )))
            .times(1)
            .returning(|_| {
                Ok(HttpResponse::ok(json!([
                    { "Id": "Stream", "Self": "https://host/tenants/T/namespaces/N/streams/Stream" }
                ])))
            });

        let datasource = datasource(&settings(BackendKind::Ocs, "", true), mock_http);
        let result = datasource.search_streams("test").await.unwrap();
        assert_eq!(
            result,
            vec![StreamOption {
                value: "https://host/tenants/T/namespaces/N/streams/Stream".to_string(),
                label: "Stream".to_string()
            }]
        );
    }

    #[tokio::test]
    async fn test_search_streams_http_error() {
        let mut mock_http = MockHttpClient::new();
        mock_http.expect_request().times(1).returning(|_| {
            Ok(HttpResponse {
                status: 401,
                status_text: "Unauthorized".to_string(),
                body: None,
            })
        });

        let datasource = datasource(&ocs_settings(), mock_http);
        let err = datasource.search_streams("x").await.unwrap_err();
        assert_eq!(err.to_string(), "401: Unauthorized");
    }

    #[tokio::test]
    async fn test_connection_success() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_request()
            .with(eq(HttpRequest::get(
                "/ocs/api/VERSION/tenants/TENANT/namespaces/NAMESPACE/streams",
            )))
            .times(1)
            .returning(|_| {
                Ok(HttpResponse {
                    status: 200,
                    ..Default::default()
                })
            });

        let datasource = datasource(&ocs_settings(), mock_http);
        let result = datasource.test_connection().await.unwrap();
        assert_eq!(result, TestResult::success("Data source is working"));
    }

    #[tokio::test]
    async fn test_connection_failure() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_request()
            .with(eq(HttpRequest::get(
                "/ocs/api/VERSION/tenants/TENANT/namespaces/NAMESPACE/streams",
            )))
            .times(1)
            .returning(|_| {
                Ok(HttpResponse {
                    status: 400,
                    status_text: "Error".to_string(),
                    body: None,
                })
            });

        let datasource = datasource(&ocs_settings(), mock_http);
        let result = datasource.test_connection().await.unwrap();
        assert_eq!(result, TestResult::error("400: Error"));
        assert_eq!(
            serde_json::to_value(&result).unwrap(),
            json!({ "status": "error", "message": "400: Error" })
        );
    }

    #[tokio::test]
    async fn test_connection_transport_failure() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_request()
            .times(1)
            .returning(|_| Err(SdsError::Transport("unreachable".to_string())));

        let datasource = datasource(&ocs_settings(), mock_http);
        let result = datasource.test_connection().await;
        assert!(matches!(result, Err(SdsError::Transport(_))));
    }

    #[test]
    fn test_datasource_from_store() {
        let mut mock_http = MockHttpClient::new();
        mock_http
            .expect_request()
            .times(1)
            .returning(|_| Err(SdsError::Transport("connection refused".to_string())));

        let store = InMemoryConfigStore::new(settings(BackendKind::Eds, "diagnostics", false));
        let datasource = SdsDataSource::from_store(&store, Arc::new(mock_http));
        assert_eq!(
            datasource.profile().listing_url(),
            "http://localhost:PORT/api/v1/tenants/default/namespaces/diagnostics/streams"
        );

        let result = tokio_test::block_on(datasource.search_streams(""));
        tokio_test::assert_err!(result);
    }
}
