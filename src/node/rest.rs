use parking_lot::RwLock;
use reqwest::{
    header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT},
    StatusCode,
};
use serde_json::Value;
use serenity::model::id::{GuildId, UserId};
use tracing::{debug, warn};

use super::models::{NodeInfo, PlayerPatch};
use crate::{
    config::NodeConfig,
    error::{NodeError, Result},
};

const API_VERSION: &str = "v4";

/// Cliente HTTP hacia los endpoints REST de un nodo.
///
/// No guarda estado entre llamadas salvo los headers de identidad.
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    password: String,
    client_name: String,
    user_id: RwLock<Option<UserId>>,
}

impl RestClient {
    pub fn new(node: &NodeConfig, client_name: &str) -> Result<Self> {
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            http,
            base_url: node.rest_base_url(),
            password: node.password.clone(),
            client_name: client_name.to_string(),
            user_id: RwLock::new(None),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Actualiza el header `User-Id` de las próximas peticiones
    pub fn set_user_id(&self, user_id: UserId) {
        *self.user_id.write() = Some(user_id);
    }

    /// Headers comunes a REST y al stream de eventos
    pub fn identity_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, header_value(&self.password)?);
        headers.insert(HeaderName::from_static("client-name"), header_value(&self.client_name)?);
        let user_id = match *self.user_id.read() {
            Some(id) => id.to_string(),
            None => String::new(),
        };
        headers.insert(HeaderName::from_static("user-id"), header_value(&user_id)?);
        Ok(headers)
    }

    fn request_headers(&self) -> Result<HeaderMap> {
        let mut headers = self.identity_headers()?;
        headers.insert(ACCEPT, HeaderValue::from_static("application/json, */*;q=0.5"));
        headers.insert(USER_AGENT, header_value(&self.client_name)?);
        Ok(headers)
    }

    /// GET que devuelve el JSON solo con HTTP 200; cualquier otro estado es `None`
    pub async fn get_json(&self, path: &str) -> Result<Option<Value>> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.http.get(&url).headers(self.request_headers()?).send().await?;

        if response.status() != StatusCode::OK {
            debug!("GET {} respondió {}", path, response.status());
            return Ok(None);
        }

        Ok(Some(response.json::<Value>().await?))
    }

    /// Metadata y capacidades del nodo
    pub async fn fetch_info(&self) -> Result<Option<NodeInfo>> {
        let path = format!("/{API_VERSION}/info");
        match self.get_json(&path).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Resuelve un identificador o búsqueda (`ytsearch:...`) en el nodo
    pub async fn load_tracks(&self, identifier: &str) -> Result<Option<Value>> {
        let path = format!(
            "/{API_VERSION}/loadtracks?identifier={}",
            urlencoding::encode(identifier)
        );
        self.get_json(&path).await
    }

    /// Actualización parcial de un player.
    ///
    /// 200/201 devuelven el cuerpo (si es JSON válido), 204 devuelve `None`
    /// y cualquier otro estado es [`NodeError::PlayerUpdateFailed`].
    pub async fn update_player(
        &self,
        session_id: &str,
        guild_id: GuildId,
        patch: &PlayerPatch,
        replace: bool,
    ) -> Result<Option<Value>> {
        let url = format!(
            "{}/{API_VERSION}/sessions/{}/players/{}?noReplace={}",
            self.base_url, session_id, guild_id, !replace
        );

        let response = self
            .http
            .patch(&url)
            .headers(self.request_headers()?)
            .json(patch)
            .send()
            .await?;

        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let body = response.bytes().await?;
                Ok(serde_json::from_slice(&body).ok())
            }
            StatusCode::NO_CONTENT => Ok(None),
            status => {
                warn!("⚠️ Player update rechazado para guild {}: {}", guild_id, status);
                Err(NodeError::PlayerUpdateFailed {
                    status: status.as_u16(),
                })
            }
        }
    }
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| NodeError::InvalidHeader(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::{
        matchers::{body_json, header, method, path, query_param},
        Mock, MockServer, ResponseTemplate,
    };

    fn client_for(server: &MockServer) -> RestClient {
        let address = server.address();
        let node = NodeConfig {
            host: address.ip().to_string(),
            port: address.port(),
            password: "youshallnotpass".to_string(),
            secure: false,
        };
        RestClient::new(&node, "OpenMusic/test").unwrap()
    }

    #[tokio::test]
    async fn test_update_player_success_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v4/sessions/abc/players/123"))
            .and(query_param("noReplace", "true"))
            .and(header("authorization", "youshallnotpass"))
            .and(body_json(json!({ "paused": true })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "guildId": "123" })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        let body = client
            .update_player("abc", GuildId::new(123), &PlayerPatch::paused(true), false)
            .await
            .unwrap();
        assert_eq!(body, Some(json!({ "guildId": "123" })));
    }

    #[tokio::test]
    async fn test_update_player_no_content_and_replace_flag() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .and(path("/v4/sessions/abc/players/7"))
            .and(query_param("noReplace", "false"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let body = client
            .update_player("abc", GuildId::new(7), &PlayerPatch::stop(), true)
            .await
            .unwrap();
        assert!(body.is_none());
    }

    #[tokio::test]
    async fn test_update_player_failure_status() {
        let server = MockServer::start().await;
        Mock::given(method("PATCH"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client_for(&server);
        let err = client
            .update_player("abc", GuildId::new(7), &PlayerPatch::volume(50), false)
            .await
            .unwrap_err();
        assert!(matches!(err, NodeError::PlayerUpdateFailed { status: 404 }));
    }

    #[tokio::test]
    async fn test_user_id_header_is_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/info"))
            .and(header("user-id", "99"))
            .and(header("client-name", "OpenMusic/test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "version": { "semver": "4.0.8", "major": 4, "minor": 0, "patch": 8 },
                "sourceManagers": ["youtube"]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server);
        client.set_user_id(UserId::new(99));
        let info = client.fetch_info().await.unwrap().unwrap();
        assert_eq!(info.version.semver, "4.0.8");
    }

    #[tokio::test]
    async fn test_get_non_ok_is_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v4/loadtracks"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert!(client.load_tracks("ytsearch:nothing").await.unwrap().is_none());
    }
}
