use serde::Serialize;

/// Credencial de voz completa que el nodo necesita para unirse al canal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceCredential {
    pub session_id: String,
    pub token: String,
    pub endpoint: String,
}

/// Acumula las piezas de la credencial de voz.
///
/// Discord entrega `session_id` (voice state) y `token`/`endpoint`
/// (voice server) en eventos separados y en cualquier orden.
#[derive(Debug, Default, Clone)]
pub struct VoiceCredentialAccumulator {
    session_id: Option<String>,
    token: Option<String>,
    endpoint: Option<String>,
    last_applied: Option<VoiceCredential>,
}

impl VoiceCredentialAccumulator {
    pub fn set_session_id(&mut self, session_id: impl Into<String>) {
        self.session_id = Some(session_id.into()).filter(|s: &String| !s.is_empty());
    }

    pub fn set_server(&mut self, token: impl Into<String>, endpoint: impl Into<String>) {
        self.token = Some(token.into()).filter(|s: &String| !s.is_empty());
        self.endpoint = Some(endpoint.into()).filter(|s: &String| !s.is_empty());
    }

    /// Credencial completa, si están las tres piezas
    pub fn complete(&self) -> Option<VoiceCredential> {
        Some(VoiceCredential {
            session_id: self.session_id.clone()?,
            token: self.token.clone()?,
            endpoint: self.endpoint.clone()?,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.session_id.is_some() && self.token.is_some() && self.endpoint.is_some()
    }

    /// Credencial completa y distinta de la última aplicada
    pub fn pending(&self) -> Option<VoiceCredential> {
        self.complete()
            .filter(|credential| self.last_applied.as_ref() != Some(credential))
    }

    /// Registra la credencial que el nodo aceptó
    pub fn mark_applied(&mut self, credential: VoiceCredential) {
        self.last_applied = Some(credential);
    }

    pub fn last_applied(&self) -> Option<&VoiceCredential> {
        self.last_applied.as_ref()
    }
}
