use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::{Error, Result};
use crate::page::PageHandle;

/// Selectors matching the elements a user can click.
pub const CLICKABLE_SELECTORS: &[&str] = &[
    "a",
    "button",
    "input[type='button']",
    "input[type='submit']",
    "[role='button']",
];

/// One clickable element of the page.
///
/// Absent attributes serialize as `null`, never as a missing key or `""`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElementDescriptor {
    pub tag_name: String,
    pub id: Option<String>,
    pub class_name: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub r#type: Option<String>,
    pub href: Option<String>,
}

/// Element record as produced by the in-page script, before normalization.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawElement {
    tag_name: String,
    id: Option<String>,
    class_name: Option<String>,
    text: Option<String>,
    r#type: Option<String>,
    href: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

impl ElementDescriptor {
    fn normalize(raw: RawElement, base: Option<&Url>) -> Self {
        let text = raw
            .text
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        let href = non_empty(raw.href).map(|href| match base.and_then(|b| b.join(&href).ok()) {
            Some(resolved) => resolved.to_string(),
            None => href,
        });
        Self {
            tag_name: raw.tag_name.to_lowercase(),
            id: non_empty(raw.id),
            class_name: non_empty(raw.class_name),
            text,
            r#type: non_empty(raw.r#type),
            href,
        }
    }
}

/// Build the in-page script for a selector union.
///
/// Attributes are read with `getAttribute` so that defaults such as a
/// button's implicit `type="submit"` are not reported. `href` is only read from
/// elements that have the property, so a `<button href>` yields `null`.
fn collect_script(selectors: &[&str]) -> Result<String> {
    let union = serde_json::to_string(&selectors.join(", "))
        .map_err(|e| Error::EvaluationError(e.to_string()))?;
    Ok(format!(
        r#"
        JSON.stringify(
            Array.from(document.querySelectorAll({union})).map(el => {{
                const rawHref = ('href' in el) ? el.getAttribute('href') : null;
                let href = null;
                if (rawHref !== null) {{
                    try {{ href = new URL(rawHref, document.baseURI).href; }} catch (_) {{ href = rawHref; }}
                }}
                return {{
                    tagName: el.tagName.toLowerCase(),
                    id: el.getAttribute('id'),
                    className: el.getAttribute('class'),
                    text: (el.textContent || '').trim() || null,
                    type: el.getAttribute('type'),
                    href: href
                }};
            }})
        )
        "#
    ))
}

/// Collect clickable elements from the currently loaded document.
///
/// Matches are returned in document order, each node at most once. No
/// matches is an empty list, not an error.
pub async fn collect<P>(page: &P, selectors: &[&str]) -> Result<Vec<ElementDescriptor>>
where
    P: PageHandle + ?Sized,
{
    let url = match page.url().await? {
        Some(url) if !url.is_empty() && url != "about:blank" => url,
        _ => {
            return Err(Error::NavigationError(
                "page is not attached to a loaded document".into(),
            ))
        }
    };
    if selectors.is_empty() {
        return Ok(Vec::new());
    }

    let script = collect_script(selectors)?;
    let value = page.evaluate(&script).await?;
    let raw: Vec<RawElement> = match value {
        Value::String(json) => serde_json::from_str(&json),
        Value::Null => Ok(Vec::new()),
        other => serde_json::from_value(other),
    }
    .map_err(|e| Error::EvaluationError(format!("unexpected element data: {e}")))?;

    let base = Url::parse(&url).ok();
    let elements: Vec<ElementDescriptor> = raw
        .into_iter()
        .map(|r| ElementDescriptor::normalize(r, base.as_ref()))
        .collect();
    tracing::debug!(url = %url, count = elements.len(), "collected elements");
    Ok(elements)
}
