//! Ordered candidate tables for every lookup the runtime performs.
//!
//! Third-party markup drifts; each call site gets a prioritized list so a
//! redesign is a configuration edit, not a code change.

use crate::driver::Lookup;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectorTable {
    /// Button that opens the login form.
    pub login_button: Vec<Lookup>,
    pub email_field: Vec<Lookup>,
    pub password_field: Vec<Lookup>,
    pub submit_button: Vec<Lookup>,
    /// Embedded frame that hosts the signal.
    pub frame: Vec<Lookup>,
    /// Frames nested inside `frame`, outermost first. Each level is its own
    /// candidate list.
    pub inner_frames: Vec<Vec<Lookup>>,
    /// Element inside the frame whose contents carry the values.
    pub container: Vec<Lookup>,
    /// Most recent value inside the container. Empty means "the container's own text".
    pub value: Vec<Lookup>,
}

impl Default for SelectorTable {
    fn default() -> Self {
        Self {
            login_button: vec![
                Lookup::xpath("//button[contains(., 'Entrar')]"),
                Lookup::xpath("//button[contains(., 'Login')]"),
            ],
            email_field: vec![Lookup::name("email"), Lookup::css("input[type='email']")],
            password_field: vec![
                Lookup::name("password"),
                Lookup::css("input[type='password']"),
            ],
            submit_button: vec![Lookup::xpath("//button[@type='submit']")],
            frame: vec![
                Lookup::xpath("//iframe[contains(@src,'aviator')]"),
                Lookup::css("iframe[src*='spribe']"),
            ],
            inner_frames: Vec::new(),
            container: vec![Lookup::css(".payouts-block")],
            value: vec![Lookup::css(".payout:first-child")],
        }
    }
}

impl SelectorTable {
    /// Names of required tables that are empty.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.frame.is_empty() {
            missing.push("frame");
        }
        if self.inner_frames.iter().any(Vec::is_empty) {
            missing.push("inner_frames");
        }
        if self.container.is_empty() {
            missing.push("container");
        }
        missing
    }

    /// Every frame level to enter, outermost first.
    pub fn frame_levels(&self) -> Vec<Vec<Lookup>> {
        std::iter::once(self.frame.clone())
            .chain(self.inner_frames.iter().cloned())
            .collect()
    }
}
