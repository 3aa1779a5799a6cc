//! Session helpers so handlers only deal with the logged-in [`Username`].

use actix_session::Session;
use actix_web::{FromRequest, HttpRequest, dev::Payload};
use futures_util::future::LocalBoxFuture;

use crate::domain::{Error, Username};

pub(crate) const USERNAME_KEY: &str = "username";

/// Wrapper exposing the session operations handlers need.
#[derive(Clone)]
pub struct SessionContext(Session);

impl SessionContext {
    pub fn new(session: Session) -> Self {
        Self(session)
    }

    /// Store the logged-in username, rotating the session id.
    pub fn persist_user(&self, username: &Username) -> Result<(), Error> {
        self.0.renew();
        self.0
            .insert(USERNAME_KEY, username.as_str())
            .map_err(|error| Error::internal(format!("failed to persist session: {error}")))
    }

    /// Drop all session state.
    pub fn clear(&self) {
        self.0.purge();
    }

    /// The logged-in username, if any. Cookies holding an invalid name are
    /// treated as anonymous.
    pub fn username(&self) -> Result<Option<Username>, Error> {
        let raw = self
            .0
            .get::<String>(USERNAME_KEY)
            .map_err(|error| Error::internal(format!("failed to read session: {error}")))?;
        Ok(raw.and_then(|raw| match Username::new(raw) {
            Ok(username) => Some(username),
            Err(error) => {
                tracing::warn!("invalid username in session cookie: {error}");
                None
            }
        }))
    }

    /// The logged-in username or `401 Unauthorized`.
    pub fn require_username(&self) -> Result<Username, Error> {
        self.username()?
            .ok_or_else(|| Error::unauthorized("login required"))
    }
}

impl FromRequest for SessionContext {
    type Error = actix_web::Error;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, payload: &mut Payload) -> Self::Future {
        let fut = Session::from_request(req, payload);
        Box::pin(async move { fut.await.map(SessionContext::new) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inbound::http::test_utils::{session_cookie, test_session_middleware};
    use actix_web::http::StatusCode;
    use actix_web::{App, HttpResponse, test, web};

    async fn require(session: SessionContext) -> Result<HttpResponse, Error> {
        let username = session.require_username()?;
        Ok(HttpResponse::Ok().body(username.to_string()))
    }

    #[actix_web::test]
    async fn round_trips_username() {
        let app = test::init_service(
            App::new()
                .wrap(test_session_middleware())
                .route(
                    "/set",
                    web::get().to(|session: SessionContext| async move {
                        let username = Username::new("alice").expect("fixture username");
                        session.persist_user(&username)?;
                        Ok::<_, Error>(HttpResponse::Ok())
                    }),
                )
                .route("/get", web::get().to(require)),
        )
        .await;

        let set_res =
            test::call_service(&app, test::TestRequest::get().uri("/set").to_request()).await;
        let cookie = session_cookie(&set_res);
        let get_res = test::call_service(
            &app,
            test::TestRequest::get().uri("/get").cookie(cookie).to_request(),
        )
        .await;
        assert_eq!(get_res.status(), StatusCode::OK);
        assert_eq!(test::read_body(get_res).await, "alice");
    }

    #[actix_web::test]
    async fn missing_user_is_unauthorised() {
        let app = test::init_service(
            App::new()
                .wrap(test_session_middleware())
                .route("/get", web::get().to(require)),
        )
        .await;
        let res = test::call_service(&app, test::TestRequest::get().uri("/get").to_request()).await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[actix_web::test]
    async fn tampered_username_is_unauthorised() {
        let app = test::init_service(
            App::new()
                .wrap(test_session_middleware())
                .route(
                    "/set-invalid",
                    web::get().to(|session: Session| async move {
                        session
                            .insert(USERNAME_KEY, "no spaces allowed")
                            .expect("set invalid username");
                        HttpResponse::Ok()
                    }),
                )
                .route("/get", web::get().to(require)),
        )
        .await;

        let set_res = test::call_service(
            &app,
            test::TestRequest::get().uri("/set-invalid").to_request(),
        )
        .await;
        let cookie = session_cookie(&set_res);
        let res = test::call_service(
            &app,
            test::TestRequest::get().uri("/get").cookie(cookie).to_request(),
        )
        .await;
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
