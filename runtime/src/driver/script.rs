//! Page scripts that resolve an element handle and act on it.
//!
//! Every call re-walks the recorded frame path from the top document, so a
//! handle never outlives the markup it points at. Scripts return a JSON
//! string so the reply survives the protocol by value.

use super::Lookup;
use serde::Deserialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Action<'a> {
    Probe,
    Text,
    Click,
    Fill(&'a str),
}

impl Action<'_> {
    fn name(&self) -> &'static str {
        match self {
            Action::Probe => "probe",
            Action::Text => "text",
            Action::Click => "click",
            Action::Fill(_) => "fill",
        }
    }

    fn value(&self) -> &str {
        match self {
            Action::Fill(v) => v,
            _ => "",
        }
    }
}

/// What a script reported back.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub(crate) enum Reply {
    Ok {
        #[serde(default)]
        text: Option<String>,
    },
    /// The last lookup found nothing (probe only).
    Missing,
    /// An intermediate lookup found nothing.
    Stale,
    /// A frame on the path is gone or not reachable.
    FrameLost,
}

const PRELUDE: &str = r#"
  const pick = (root, step) => {
    const doc = root.ownerDocument || root;
    if (step.by === "xpath") {
      return doc.evaluate(step.selector, root, null, 9, null).singleNodeValue;
    }
    if (step.by === "name") {
      return root.querySelector('[name="' + CSS.escape(step.selector) + '"]');
    }
    return root.querySelector(step.selector);
  };
  const walk = (root, steps) => {
    let node = root;
    for (let i = 0; i < steps.length; i++) {
      node = pick(node, steps[i]);
      if (!node) return { node: null, depth: i };
    }
    return { node, depth: steps.length };
  };
  let doc = document;
  for (const frame of frames) {
    const hit = walk(doc, frame);
    if (!hit.node || !hit.node.contentDocument) return JSON.stringify({ status: "frame_lost" });
    doc = hit.node.contentDocument;
  }
  const hit = walk(doc, chain);
  if (!hit.node) {
    const last = hit.depth === chain.length - 1;
    return JSON.stringify({ status: action === "probe" && last ? "missing" : "stale" });
  }
  const el = hit.node;
  if (action === "text") {
    return JSON.stringify({ status: "ok", text: el.innerText ?? el.textContent ?? "" });
  }
  if (action === "click") {
    el.click();
  } else if (action === "fill") {
    el.focus();
    const desc = Object.getOwnPropertyDescriptor(Object.getPrototypeOf(el), "value");
    if (desc && desc.set) { desc.set.call(el, value); } else { el.value = value; }
    el.dispatchEvent(new Event("input", { bubbles: true }));
    el.dispatchEvent(new Event("change", { bubbles: true }));
  }
  return JSON.stringify({ status: "ok" });
"#;

/// Build the expression for `action` on the element at `chain` inside `frames`.
pub(crate) fn build(frames: &[Vec<Lookup>], chain: &[Lookup], action: Action<'_>) -> String {
    // serde_json output is a valid JS literal for every value used here.
    let frames = serde_json::to_string(frames).unwrap_or_else(|_| "[]".to_string());
    let chain = serde_json::to_string(chain).unwrap_or_else(|_| "[]".to_string());
    let value = serde_json::Value::String(action.value().to_string()).to_string();
    format!(
        "(() => {{\n  const frames = {frames};\n  const chain = {chain};\n  const action = \"{}\";\n  const value = {value};\n{PRELUDE}}})()",
        action.name()
    )
}

pub(crate) fn parse_reply(raw: &str) -> Result<Reply, serde_json::Error> {
    serde_json::from_str(raw)
}
