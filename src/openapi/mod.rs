//! OpenAPI document composition
//!
//! Renders the API document submitted as a service config. The source is
//! either user supplied (inline or from a ConfigMap) or the default wildcard
//! document that proxies every path to the target. Rendering uses minijinja
//! with strict undefined handling, so a misspelled variable fails the render
//! instead of producing an empty host.
//!
//! Variables available to documents:
//! - `endpoint`: managed service name, used as `host`
//! - `target`: backend address
//! - `jwt_audiences`: list of backend audiences (may be empty)

mod legacy;

use std::collections::BTreeMap;

use minijinja::{context, Environment, UndefinedBehavior};
use serde_yaml::{Mapping, Value};

pub use legacy::normalize_placeholders;

use crate::Error;

/// Swagger 2.0 document accepting every method on every path
pub const WILDCARD_DOCUMENT: &str = r#"swagger: "2.0"
info:
  description: "wildcard config for any HTTP service."
  title: "General HTTP Service."
  version: "1.0.0"
host: "{{ endpoint }}"
x-google-endpoints:
- name: "{{ endpoint }}"
  target: "{{ target }}"
basePath: "/"
consumes:
- "application/json"
produces:
- "application/json"
schemes:
- "http"
- "https"
paths:
  "/**":
    get:
      operationId: Get
      responses:
        '200':
          description: Get
        default:
          description: Error
    delete:
      operationId: Delete
      responses:
        '204':
          description: Delete
        default:
          description: Error
    patch:
      operationId: Patch
      responses:
        '200':
          description: Patch
        default:
          description: Error
    post:
      operationId: Post
      responses:
        '200':
          description: Post
        default:
          description: Error
    put:
      operationId: Put
      responses:
        '200':
          description: Put
        default:
          description: Error
"#;

/// IAP-issued bearer token requirement added when audiences are known
const JWT_SECURITY: &str = r#"security:
- google_jwt: []
securityDefinitions:
  google_jwt:
    authorizationUrl: ""
    flow: "implicit"
    type: "oauth2"
    x-google-issuer: "https://cloud.google.com/iap"
    x-google-jwks_uri: "https://www.gstatic.com/iap/verify/public_key-jwk"
    x-google-audiences: "{{ jwt_audiences | join(",") }}"
"#;

/// Inputs substituted into a document
#[derive(Clone, Copy, Debug)]
pub struct DocumentVars<'a> {
    /// Managed service name
    pub endpoint: &'a str,
    /// Backend address
    pub target: &'a str,
    /// Backend audiences; empty when no JWT validation is wanted
    pub jwt_audiences: &'a [String],
}

/// Renders and validates API documents
pub struct SpecComposer {
    env: Environment<'static>,
}

impl Default for SpecComposer {
    fn default() -> Self {
        Self::new()
    }
}

impl SpecComposer {
    /// Create a composer with strict undefined-variable handling
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        env.set_keep_trailing_newline(true);
        Self { env }
    }

    /// Render `source`, or the wildcard document when `None`, and validate it
    ///
    /// When audiences are given and the document declares no
    /// `securityDefinitions`, the IAP bearer token requirement is merged in.
    pub fn compose(&self, source: Option<&str>, vars: &DocumentVars<'_>) -> Result<String, Error> {
        let rendered = self.render(source.unwrap_or(WILDCARD_DOCUMENT), vars)?;
        let mut document = validate_document(&rendered)?;

        if vars.jwt_audiences.is_empty() || document.contains_key("securityDefinitions") {
            return Ok(rendered);
        }

        let security: Mapping = serde_yaml::from_str(&self.render(JWT_SECURITY, vars)?)?;
        for (key, value) in security {
            if !document.contains_key(&key) {
                document.insert(key, value);
            }
        }
        Ok(serde_yaml::to_string(&document)?)
    }

    /// Substitute variables into a template
    pub fn render(&self, template: &str, vars: &DocumentVars<'_>) -> Result<String, Error> {
        let normalized = normalize_placeholders(template);
        let rendered = self.env.render_str(
            &normalized,
            context! {
                endpoint => vars.endpoint,
                target => vars.target,
                jwt_audiences => vars.jwt_audiences,
            },
        )?;
        Ok(rendered)
    }
}

/// Serialize an inline document to YAML
pub fn inline_document(document: &BTreeMap<String, serde_json::Value>) -> Result<String, Error> {
    Ok(serde_yaml::to_string(document)?)
}

/// Check that `document` is a YAML mapping declaring `swagger` or `openapi`
pub fn validate_document(document: &str) -> Result<Mapping, Error> {
    let value: Value = serde_yaml::from_str(document)
        .map_err(|e| Error::validation(format!("document is not valid YAML: {e}")))?;

    let Value::Mapping(mapping) = value else {
        return Err(Error::validation("document is not a YAML mapping"));
    };
    if !mapping.contains_key("swagger") && !mapping.contains_key("openapi") {
        return Err(Error::validation(
            "document declares neither swagger nor openapi",
        ));
    }
    Ok(mapping)
}
