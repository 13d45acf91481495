//! The reqwest gateway against mock servers.

use serde_json::json;
use sinatra::{
    context::{AlwaysVisible, Identity},
    mirror::{MemoryStore, Store},
    native::{HttpGateway, TokioClock},
    poller::Tick,
    session::{LoginOutcome, Route},
    Config, Context, Error, Track,
};
use std::rc::Rc;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn context(server: &MockServer, cookie: Option<&str>) -> (Context, Rc<MemoryStore>) {
    let config = Config::new(server.uri()).unwrap();
    let mut gateway = HttpGateway::new(&config).unwrap();
    if let Some(cookie) = cookie {
        gateway = gateway.with_user_cookie(cookie).unwrap();
    }
    let identity = gateway.identity().unwrap();
    let store = MemoryStore::new();
    let context = Context::new(
        config,
        Rc::new(gateway),
        store.clone(),
        Rc::new(TokioClock),
        Rc::new(identity),
        Rc::new(AlwaysVisible),
    );
    (context, store)
}

#[tokio::test]
async fn test_login_sends_session_cookie() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/session"))
        .and(header("cookie", "sinatra_user_id=u1.sig"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "user_id": "u1",
            "display_name": "User",
            "playlists": {"all": [{"playlist_id": "p1", "track_count": 2}], "featured": []},
            "last_played": {"name": "X", "artist": "Y"}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let (context, store) = context(&server, Some("u1.sig"));
    assert_eq!(
        context.identity.user_marker().as_deref(),
        Some("u1.sig")
    );
    let LoginOutcome::Authenticated(session) = context.session.login(&Route::Home).await else {
        panic!("expected a session");
    };
    assert_eq!(session.playlists.all[0].id, "p1");
    assert_eq!(session.playlists.all[0].tracks, 2);
    assert!(store.get("session").unwrap().is_some());
}

#[tokio::test]
async fn test_unauthorized_login() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/session"))
        .respond_with(
            ResponseTemplate::new(401).set_body_json(json!({"detail": "Invalid session"})),
        )
        .mount(&server)
        .await;

    let (context, _) = context(&server, Some("expired"));
    assert_eq!(
        context.session.login(&Route::Home).await,
        LoginOutcome::Unauthenticated
    );
}

#[tokio::test]
async fn test_no_cookie_no_request() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let (context, _) = context(&server, None);
    assert_eq!(
        context.session.login(&Route::Home).await,
        LoginOutcome::Unauthenticated
    );
}

#[tokio::test]
async fn test_server_error_is_not_parsed() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/session"))
        .respond_with(ResponseTemplate::new(502).set_body_string("<html>Bad Gateway</html>"))
        .mount(&server)
        .await;

    let (context, _) = context(&server, Some("u1.sig"));
    assert_eq!(
        context.session.login(&Route::Home).await,
        LoginOutcome::NetworkError(Error::RequestFailed {
            status: 502,
            body: "<html>Bad Gateway</html>".to_owned()
        })
    );
}

#[tokio::test]
async fn test_poller_tick() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/update-playing"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"track": null})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/recently-played"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"track": {"name": "X", "artist": "Y"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let (context, store) = context(&server, Some("u1.sig"));
    let poller = context.poller();
    assert_eq!(poller.tick().await, Tick::Changed(Track::new("X", "Y")));
    assert!(store.get("last_played_updated_at").unwrap().is_some());
}

#[tokio::test]
async fn test_playlist_endpoints() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/delete-user"))
        .and(query_param("user_id", "u 1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "deleted"})))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/add-playlists"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({"playlists": [{"id": "p1"}]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let (context, _) = context(&server, Some("u1.sig"));
    context.api.delete_user("u 1").await.unwrap();
    context.api.add_playlists(&["p1".to_owned()]).await.unwrap();
}

#[tokio::test]
async fn test_unreachable_server() {
    let config = Config::new("http://127.0.0.1:9").unwrap();
    let gateway = HttpGateway::new(&config).unwrap();
    let identity = gateway.identity().unwrap();
    let context = Context::new(
        config,
        Rc::new(gateway),
        MemoryStore::new(),
        Rc::new(TokioClock),
        Rc::new(identity),
        Rc::new(AlwaysVisible),
    );
    let error = context.api.genres().await.unwrap_err();
    assert!(matches!(error, Error::NetworkFailure(_)));
}
