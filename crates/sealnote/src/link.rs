use anyhow::{bail, Context, Result};

/// A shareable note link: `{server}/note/{id}#{key}`.
///
/// The key lives only in the fragment. [`NoteLink::api_url`] is the one URL
/// that goes over the wire and never carries it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteLink {
    pub server: String,
    pub id: String,
    pub key: String,
}

impl NoteLink {
    pub fn new(server: &str, id: &str, key: &str) -> Self {
        Self {
            server: server.trim_end_matches('/').to_owned(),
            id: id.to_owned(),
            key: key.to_owned(),
        }
    }

    pub fn parse(link: &str) -> Result<Self> {
        let (url, key) = link
            .trim()
            .split_once('#')
            .context("link has no decryption key (missing '#' fragment)")?;
        if key.is_empty() {
            bail!("link has an empty decryption key");
        }
        let (server, id) = url
            .rsplit_once("/note/")
            .context("link is not a note link (expected .../note/<id>#<key>)")?;
        let id = id.trim_end_matches('/');
        if id.is_empty() || id.contains('/') {
            bail!("link has no note id");
        }
        Ok(Self::new(server, id, key))
    }

    pub fn api_url(&self) -> String {
        format!("{}/api/notes/{}", self.server, self.id)
    }
}

impl std::fmt::Display for NoteLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/note/{}#{}", self.server, self.id, self.key)
    }
}
