use super::*;

#[test]
fn endpoint_gets_leading_slash() {
    assert_eq!(normalize_endpoint("node-info"), "/node-info");
    assert_eq!(normalize_endpoint(" /logs "), "/logs");
}

#[test]
fn query_pairs_are_split_on_first_equals() {
    let pairs = parse_query(&["schain-name=alpha".to_owned(), "x=a=b".to_owned()]).unwrap();
    assert_eq!(pairs, vec![("schain-name".into(), "alpha".into()), ("x".into(), "a=b".into())]);
}

#[test]
fn query_pair_without_key_is_rejected() {
    assert!(matches!(parse_query(&["=1".to_owned()]), Err(CliError::InvalidQuery(_))));
    assert!(matches!(parse_query(&["flag".to_owned()]), Err(CliError::InvalidQuery(_))));
}

#[test]
fn session_cookies_drop_attributes() {
    let mut headers = HeaderMap::new();
    headers.append(SET_COOKIE, HeaderValue::from_static("skale_token=abc; Path=/; HttpOnly"));
    headers.append(SET_COOKIE, HeaderValue::from_static("theme=dark"));
    assert_eq!(session_cookies(&headers), "skale_token=abc; theme=dark");
}

#[test]
fn unauthenticated_rejection_maps_to_login_hint() {
    let outcome = polling::classify::<Value>(r#"{"data":null,"errors":[{"msg":"no token","code":401}]}"#);
    assert!(matches!(into_result(outcome), Err(CliError::Unauthenticated)));
}

#[test]
fn other_rejection_keeps_backend_message() {
    let outcome = polling::classify::<Value>(r#"{"errors":[{"msg":"Docker is down","code":500}]}"#);
    match into_result(outcome) {
        Err(CliError::Rejected(message)) => assert_eq!(message, "Docker is down"),
        other => panic!("unexpected: {other:?}"),
    }
}

#[test]
fn data_is_returned_on_success() {
    let outcome = polling::classify::<Value>(r#"{"data":{"status":2}}"#);
    assert_eq!(into_result(outcome).unwrap()["status"], 2);
}

#[test]
fn watch_args_parse_with_defaults() {
    let cli = Cli::try_parse_from(["node-ui-cli", "--base-url", "http://h:1", "watch", "containers-info"]).unwrap();
    match cli.command {
        Command::Watch(args) => {
            assert_eq!(args.endpoint, "containers-info");
            assert_eq!(args.interval_ms, 6000);
            assert_eq!(args.count, None);
        }
        other => panic!("unexpected: {other:?}"),
    }
}
