use fundwatch::AppCommand;
use fundwatch::core::engine::PersistedState;
use fundwatch::store::StateStore;
use fundwatch::store::disk::DiskStateStore;
use std::fs;
use std::path::Path;
use tempfile::TempDir;
use tracing::info;

// Adds automatic logging to test
mod test_utils {
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub fn valuation_body(code: &str, name: &str, change: &str) -> String {
        format!(
            r#"jsonpgz({{"fundcode":"{code}","name":"{name}","jzrq":"2024-03-01","dwjz":"1.0000","gsz":"1.0100","gszzl":"{change}","gztime":"2024-03-04 14:30"}});"#
        )
    }

    pub async fn mount_valuation(server: &MockServer, code: &str, name: &str, change: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/js/{code}.js")))
            .respond_with(ResponseTemplate::new(200).set_body_string(valuation_body(code, name, change)))
            .mount(server)
            .await;
    }

    pub async fn mount_failing_valuation(server: &MockServer, code: &str) {
        Mock::given(method("GET"))
            .and(path(format!("/js/{code}.js")))
            .respond_with(ResponseTemplate::new(500))
            .mount(server)
            .await;
    }

    pub async fn mount_search_index(server: &MockServer) {
        let index = r#"var r = [["000001","HXCZHH","华夏成长混合","混合型-灵活","HUAXIA"],["110022","YFDXF","易方达消费行业股票","股票型","YIFANGDA"]];"#;
        Mock::given(method("GET"))
            .and(path("/js/fundcode_search.js"))
            .respond_with(ResponseTemplate::new(200).set_body_string(index))
            .mount(server)
            .await;
    }

    pub async fn mount_history(server: &MockServer, code: &str) {
        let body = r#"{"Data":{"LSJZList":[
            {"FSRQ":"2024-03-05","DWJZ":"1.12","JZZZL":"1.00"},
            {"FSRQ":"2024-03-04","DWJZ":"1.10","JZZZL":"0.50"}
        ]},"ErrCode":0}"#;
        Mock::given(method("GET"))
            .and(path("/f10/lsjz"))
            .and(query_param("fundCode", code))
            .and(query_param("pageSize", "7"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body))
            .mount(server)
            .await;
    }
}

/// Config pointing every endpoint at `server_uri` and storing state in `data`.
fn write_config(dir: &TempDir, server_uri: &str, data: &Path) -> String {
    let config_path = dir.path().join("config.yaml");
    let config_content = format!(
        r#"
providers:
  eastmoney:
    valuation:
      base_url: "{server_uri}"
      timeout_ms: 2000
    search:
      base_url: "{server_uri}"
    history:
      base_url: "{server_uri}"
refresh:
  auto_refresh: false
  interval_ms: 30000
data_path: "{}"
"#,
        data.display()
    );
    fs::write(&config_path, config_content).expect("Failed to write config file");
    config_path.to_string_lossy().into_owned()
}

async fn saved_state(data: &Path) -> Option<PersistedState> {
    let store = DiskStateStore::open(&data.join("state")).expect("Failed to open state store");
    store.load().await.expect("Failed to load state")
}

fn codes(state: &PersistedState) -> Vec<&str> {
    state.watch_list.iter().map(|f| f.code.as_str()).collect()
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_valuation(&server, "000001", "华夏成长混合", "0.84").await;
    test_utils::mount_valuation(&server, "110022", "易方达消费行业股票", "-1.10").await;

    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let config = write_config(&dir, &server.uri(), &data);

    let result = fundwatch::run_command(
        AppCommand::Add {
            codes: vec!["110022".to_string(), " 000001 ".to_string()],
        },
        Some(&config),
    )
    .await;
    assert!(result.is_ok(), "Add failed with: {:?}", result.err());

    let state = saved_state(&data).await.unwrap();
    info!(?state, "Saved after add");
    assert_eq!(codes(&state), vec!["110022", "000001"]);
    assert!(!state.watch_list[0].is_rising);
    assert!(state.watch_list[1].is_rising);
    // Settings come from the config until they are saved
    assert!(!state.auto_refresh);
    assert_eq!(state.refresh_interval, 30_000);

    let result = fundwatch::run_command(AppCommand::List { force: false }, Some(&config)).await;
    assert!(result.is_ok(), "List failed with: {:?}", result.err());

    let result = fundwatch::run_command(
        AppCommand::Remove {
            codes: vec!["110022".to_string()],
        },
        Some(&config),
    )
    .await;
    assert!(result.is_ok(), "Remove failed with: {:?}", result.err());

    let state = saved_state(&data).await.unwrap();
    assert_eq!(codes(&state), vec!["000001"]);
}

#[test_log::test(tokio::test)]
async fn test_add_keeps_successes_when_one_code_fails() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_valuation(&server, "000001", "华夏成长混合", "0.84").await;
    test_utils::mount_failing_valuation(&server, "999999").await;

    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let config = write_config(&dir, &server.uri(), &data);

    let result = fundwatch::run_command(
        AppCommand::Add {
            codes: vec!["999999".to_string(), "000001".to_string()],
        },
        Some(&config),
    )
    .await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("Failed to add 1 of 2"));

    let state = saved_state(&data).await.unwrap();
    assert_eq!(codes(&state), vec!["000001"]);
}

#[test_log::test(tokio::test)]
async fn test_list_fails_when_every_fetch_fails_but_keeps_records() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_valuation(&server, "000001", "华夏成长混合", "0.84").await;

    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let config = write_config(&dir, &server.uri(), &data);

    fundwatch::run_command(
        AppCommand::Add {
            codes: vec!["000001".to_string()],
        },
        Some(&config),
    )
    .await
    .unwrap();

    // Provider goes away between runs
    server.reset().await;
    test_utils::mount_failing_valuation(&server, "000001").await;

    let result = fundwatch::run_command(AppCommand::List { force: true }, Some(&config)).await;
    assert!(result.is_err());

    let state = saved_state(&data).await.unwrap();
    assert_eq!(codes(&state), vec!["000001"]);
    assert_eq!(state.watch_list[0].estimate_change, 0.84);
}

#[test_log::test(tokio::test)]
async fn test_auto_settings_are_saved() {
    let server = wiremock::MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let config = write_config(&dir, &server.uri(), &data);

    fundwatch::run_command(
        AppCommand::Auto {
            enabled: Some(true),
            interval_ms: Some(120_000),
        },
        Some(&config),
    )
    .await
    .unwrap();

    let state = saved_state(&data).await.unwrap();
    assert!(state.auto_refresh);
    assert_eq!(state.refresh_interval, 120_000);

    let result = fundwatch::run_command(
        AppCommand::Auto {
            enabled: None,
            interval_ms: Some(0),
        },
        Some(&config),
    )
    .await;
    assert!(result.is_err());
    assert_eq!(saved_state(&data).await.unwrap().refresh_interval, 120_000);
}

#[test_log::test(tokio::test)]
async fn test_search_and_history_do_not_touch_saved_state() {
    let server = wiremock::MockServer::start().await;
    test_utils::mount_search_index(&server).await;
    test_utils::mount_history(&server, "000001").await;

    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let config = write_config(&dir, &server.uri(), &data);

    let result = fundwatch::run_command(
        AppCommand::Search {
            keyword: "华夏".to_string(),
        },
        Some(&config),
    )
    .await;
    assert!(result.is_ok(), "Search failed with: {:?}", result.err());

    let result = fundwatch::run_command(
        AppCommand::History {
            code: "000001".to_string(),
            range: "7d".parse().unwrap(),
        },
        Some(&config),
    )
    .await;
    assert!(result.is_ok(), "History failed with: {:?}", result.err());

    assert!(saved_state(&data).await.is_none());
}

#[test_log::test(tokio::test)]
async fn test_search_reports_provider_failure() {
    let server = wiremock::MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    let config = write_config(&dir, &server.uri(), &data);

    // No index mounted, so wiremock answers 404
    let result = fundwatch::run_command(
        AppCommand::Search {
            keyword: "000001".to_string(),
        },
        Some(&config),
    )
    .await;
    let err = result.unwrap_err();
    assert!(err.to_string().contains("404"), "unexpected error: {err}");
}

#[test_log::test(tokio::test)]
async fn test_missing_config_path_is_an_error() {
    let result = fundwatch::run_command(
        AppCommand::List { force: false },
        Some("/definitely/not/here/config.yaml"),
    )
    .await;
    assert!(result.is_err());
}
