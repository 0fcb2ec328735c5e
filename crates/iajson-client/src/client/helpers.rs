//! Request construction: path substitution and parameter routing.

use std::collections::HashMap;

use serde_json::{Map, Value};
use url::Url;

use crate::endpoints::Operation;
use crate::error::{IaJsonError, IaJsonResult, ValidationError};

/// Where each caller parameter ended up.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct RoutedRequest {
    /// Absolute URL with substituted path and query string.
    pub url: String,
    /// Compact JSON body for POST/PUT/PATCH; `None` when nothing is left over.
    pub body: Option<String>,
}

/// Text form of a parameter for the path or query string.
pub(crate) fn param_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Substitute `{name}` placeholders in one template segment.
///
/// Every substituted name is recorded in `consumed` so a placeholder that
/// appears twice resolves to the same value.
fn substitute_segment(
    segment: &str,
    operation: &str,
    params: &mut Map<String, Value>,
    consumed: &mut HashMap<String, String>,
) -> Result<String, ValidationError> {
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;

    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|c| open + c) else {
            break;
        };
        out.push_str(&rest[..open]);
        let name = &rest[open + 1..close];

        let value = match consumed.get(name) {
            Some(v) => v.clone(),
            None => {
                let value = params.remove(name).ok_or_else(|| {
                    ValidationError::MissingParameter {
                        operation: operation.to_string(),
                        name: name.to_string(),
                    }
                })?;
                let text = param_text(&value);
                consumed.insert(name.to_string(), text.clone());
                text
            }
        };
        out.push_str(&value);
        rest = &rest[close + 1..];
    }
    out.push_str(rest);

    // The url crate resolves these instead of escaping them.
    if out != segment && (out == "." || out == "..") {
        return Err(ValidationError::InvalidPathSegment {
            operation: operation.to_string(),
            segment: out,
        });
    }
    Ok(out)
}

/// Build the request URL and body for `operation`.
///
/// Path parameters are consumed first and percent-encoded as whole path
/// segments, so a value containing `/` cannot add a segment. Remaining
/// parameters go to the query string for GET/DELETE and to the JSON body
/// for POST/PUT/PATCH.
pub(crate) fn route_params(
    base_url: &str,
    operation: &Operation,
    mut params: Map<String, Value>,
) -> IaJsonResult<RoutedRequest> {
    let mut url = Url::parse(base_url)
        .map_err(|e| IaJsonError::config(format!("invalid api.base_url {base_url}: {e}")))?;

    let mut consumed = HashMap::new();
    let mut segments = Vec::new();
    let template = operation.path_template.trim_start_matches('/');
    if !template.is_empty() {
        for segment in template.split('/') {
            segments.push(substitute_segment(
                segment,
                &operation.name,
                &mut params,
                &mut consumed,
            )?);
        }
    }

    {
        let mut path = url
            .path_segments_mut()
            .map_err(|_| IaJsonError::config(format!("api.base_url cannot be a base: {base_url}")))?;
        path.pop_if_empty();
        for segment in &segments {
            path.push(segment);
        }
    }

    let mut body = None;
    if !params.is_empty() {
        if operation.method.has_body() {
            body = Some(Value::Object(params).to_string());
        } else {
            let mut query = url.query_pairs_mut();
            for (name, value) in &params {
                query.append_pair(name, &param_text(value));
            }
        }
    }

    Ok(RoutedRequest {
        url: url.into(),
        body,
    })
}
