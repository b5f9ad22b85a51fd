//! End-to-end coverage of the cookie introspection gateway: `POST
//! /cookie/nginx` and `GET /cookie/entry/{domain_id}`.

mod common;

use std::collections::HashMap;

use axum::{
    body::Body,
    http::{Request, StatusCode, header},
};
use tower::ServiceExt;

use common::{CLIENT_ID, DOMAIN, DOMAIN_ID, REDIRECT_URI, build_state, seed_root_session};

fn authorize_uri(scope: &str) -> String {
    let mut qs = url::form_urlencoded::Serializer::new(String::new());
    qs.append_pair("response_type", "code");
    qs.append_pair("client_id", CLIENT_ID);
    qs.append_pair("redirect_uri", REDIRECT_URI);
    qs.append_pair("scope", scope);
    format!("/openidconnect/authorize?{}", qs.finish())
}

fn query_pairs(location: &str) -> HashMap<String, String> {
    url::Url::parse(location).unwrap().query_pairs().into_owned().collect()
}

#[tokio::test]
async fn introspection_without_session_cookie_is_unauthorized() {
    let (state, _tenants) = build_state();
    let app = oidc_http::build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/cookie/nginx")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.expect("request should succeed");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let cleared = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("unauthorized reply still clears any stale cookie")
        .to_str()
        .unwrap();
    assert!(cleared.contains("Max-Age=0"));
}

/// The introspection handler mints a Bearer token and strips this
/// application's own cookie out of the forwarded `Cookie` header so the
/// upstream service never sees it, round-tripping the remaining cookies
/// unchanged.
#[tokio::test]
async fn introspection_mints_bearer_and_strips_only_its_own_cookie() {
    let (state, _tenants) = build_state();
    let (_, cookie) = seed_root_session(&state).await;
    let app = oidc_http::build_router(state);

    let forwarded = format!("{cookie}; other_app=keep-me");
    let request = Request::builder()
        .method("POST")
        .uri("/cookie/nginx")
        .header(header::COOKIE, forwarded)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.expect("request should succeed");

    assert_eq!(response.status(), StatusCode::OK);
    let bearer = response
        .headers()
        .get(header::AUTHORIZATION)
        .expect("introspection issues a Bearer token")
        .to_str()
        .unwrap();
    assert!(bearer.starts_with("Bearer "));

    let stripped = response
        .headers()
        .get(header::COOKIE)
        .expect("introspection echoes the stripped Cookie header")
        .to_str()
        .unwrap();
    assert!(!stripped.contains("SeaCatSCI"));
    assert!(stripped.contains("other_app=keep-me"));
}

#[tokio::test]
async fn introspection_keeps_cookie_when_keepcookie_is_set() {
    let (state, _tenants) = build_state();
    let (_, cookie) = seed_root_session(&state).await;
    let app = oidc_http::build_router(state);

    let request = Request::builder()
        .method("POST")
        .uri("/cookie/nginx?keepcookie=1")
        .header(header::COOKIE, cookie.clone())
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.expect("request should succeed");

    assert_eq!(response.status(), StatusCode::OK);
    let forwarded = response.headers().get(header::COOKIE).unwrap().to_str().unwrap();
    assert!(forwarded.contains("SeaCatSCI"));
}

#[tokio::test]
async fn cookie_entry_exchanges_code_for_domain_scoped_cookie() {
    let (state, _tenants) = build_state();
    let (_, root_cookie) = seed_root_session(&state).await;
    let app = oidc_http::build_router(state);

    let request = Request::builder()
        .uri(authorize_uri("openid cookie"))
        .header(header::COOKIE, root_cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.expect("request should succeed");
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string();
    let pairs = query_pairs(&location);
    // `reply_success` already attaches a domain cookie for a matching
    // redirect_uri; `/cookie/entry` is the separate redemption path used
    // when the requesting domain isn't the one authorize was called from.
    let code = pairs.get("code").cloned().expect("authorize with cookie scope still returns a code");

    let entry_uri = format!("/cookie/entry/{DOMAIN_ID}?grant_type=authorization_code&code={code}");
    let request = Request::builder()
        .uri(entry_uri)
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.expect("request should succeed");

    assert!(response.status().is_redirection());
    let set_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .expect("cookie entry sets the domain-scoped cookie")
        .to_str()
        .unwrap();
    assert!(set_cookie.starts_with("SeaCatSCI="));
    assert!(set_cookie.contains(&format!("Domain={DOMAIN}")));
}

#[tokio::test]
async fn cookie_entry_rejects_unknown_domain() {
    let (state, _tenants) = build_state();
    let app = oidc_http::build_router(state);

    let request = Request::builder()
        .uri("/cookie/entry/not-a-real-domain?grant_type=authorization_code&code=whatever")
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.expect("request should succeed");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn cookie_entry_rejects_a_reused_code() {
    let (state, _tenants) = build_state();
    let (_, root_cookie) = seed_root_session(&state).await;
    let app = oidc_http::build_router(state);

    let request = Request::builder()
        .uri(authorize_uri("openid cookie"))
        .header(header::COOKIE, root_cookie)
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(request).await.expect("request should succeed");
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap().to_string();
    let code = query_pairs(&location).remove("code").unwrap();

    let entry_uri = format!("/cookie/entry/{DOMAIN_ID}?grant_type=authorization_code&code={code}");
    let first = Request::builder().uri(entry_uri.clone()).body(Body::empty()).unwrap();
    let response = app.clone().oneshot(first).await.expect("request should succeed");
    assert!(response.status().is_redirection());

    let second = Request::builder().uri(entry_uri).body(Body::empty()).unwrap();
    let response = app.oneshot(second).await.expect("request should succeed");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
