use anyhow::{Result, bail};
use async_trait::async_trait;
use chatcore::net::{HttpClient, HttpRequest, HttpResponse};
use ureq::Agent;
use ureq::http;

/// Blocking `ureq` agent behind the async [`HttpClient`] seam. Each request
/// runs on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct UreqHttpClient {
    agent: Agent,
}

impl UreqHttpClient {
    pub fn new() -> Self {
        // Error statuses come back as responses; the GraphQL client decides
        // what a 401 means.
        let config = Agent::config_builder().http_status_as_error(false).build();
        Self {
            agent: Agent::new_with_config(config),
        }
    }
}

impl Default for UreqHttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn call(agent: &Agent, request: HttpRequest) -> Result<HttpResponse> {
    let mut builder = http::Request::builder().uri(&request.url);
    for (key, value) in &request.headers {
        builder = builder.header(key, value);
    }

    let response = match request.method.as_str() {
        "GET" => agent.run(builder.method(http::Method::GET).body(())?)?,
        "POST" => {
            let body = request.body.unwrap_or_default();
            agent.run(builder.method(http::Method::POST).body(body)?)?
        }
        method => bail!("Unsupported HTTP method: {method}"),
    };

    let status_code = response.status().as_u16();
    let body = response.into_body().read_to_vec()?;
    Ok(HttpResponse { status_code, body })
}

#[async_trait]
impl HttpClient for UreqHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let agent = self.agent.clone();
        tokio::task::spawn_blocking(move || call(&agent, request)).await?
    }
}
