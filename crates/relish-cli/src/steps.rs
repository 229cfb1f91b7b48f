//! Builtin step library.
//!
//! A small vocabulary over the driver boundary, enough to write smoke
//! features against any session backend. Embedders with their own
//! vocabulary register into a `RegexRegistry` through the library API
//! instead.

use async_trait::async_trait;
use std::sync::Arc;

use relish_core::driver::Driver;
use relish_core::errors::{EngineError, Result};
use relish_core::matcher::{RegexRegistry, StepContext, StepImpl};

struct Open;

#[async_trait]
impl StepImpl for Open {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let url = ctx.capture(1).to_string();
        ctx.driver.navigate(&url).await
    }
}

struct Click;

#[async_trait]
impl StepImpl for Click {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let selector = ctx.capture(1).to_string();
        ctx.driver.click(&selector).await
    }
}

struct TypeInto;

#[async_trait]
impl StepImpl for TypeInto {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let text = ctx.capture(1).to_string();
        let selector = ctx.capture(2).to_string();
        ctx.driver.type_text(&selector, &text).await
    }
}

struct SetVar;

#[async_trait]
impl StepImpl for SetVar {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let name = ctx.capture(1).to_string();
        let value = ctx.capture(2).to_string();
        ctx.scope.define(name, value);
        Ok(())
    }
}

/// Polls element presence until the retry budget runs out.
struct WaitToSee;

#[async_trait]
impl StepImpl for WaitToSee {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let selector = ctx.capture(1).to_string();
        if ctx.driver.element_present(&selector).await? {
            Ok(())
        } else {
            Err(EngineError::not_yet(format!("\"{selector}\" not present")))
        }
    }
}

/// Polls element text until it matches exactly.
struct ShouldRead;

#[async_trait]
impl StepImpl for ShouldRead {
    async fn run(&self, ctx: &mut StepContext<'_>) -> Result<()> {
        let expected = ctx.capture(1).to_string();
        let selector = ctx.capture(2).to_string();
        match ctx.driver.element_text(&selector).await? {
            Some(actual) if actual == expected => Ok(()),
            Some(actual) => Err(EngineError::not_yet(format!(
                "\"{selector}\" reads {actual:?}, want {expected:?}"
            ))),
            None => Err(EngineError::not_yet(format!("\"{selector}\" not present"))),
        }
    }
}

pub fn registry() -> anyhow::Result<RegexRegistry> {
    let mut reg = RegexRegistry::new();
    reg.register(r#"I open "([^"]+)""#, Arc::new(Open))?;
    reg.register(r#"I click "([^"]+)""#, Arc::new(Click))?;
    reg.register(r#"I type "([^"]*)" into "([^"]+)""#, Arc::new(TypeInto))?;
    reg.register(r#"I set "([A-Za-z0-9_]+)" to "([^"]*)""#, Arc::new(SetVar))?;
    reg.register_retryable(r#"I wait to see "([^"]+)""#, Arc::new(WaitToSee))?;
    reg.register_retryable(r#"I should see "([^"]+)" in "([^"]+)""#, Arc::new(ShouldRead))?;
    Ok(reg)
}

#[cfg(test)]
mod tests {
    use relish_core::matcher::{RetryMode, StepMatcher};

    use super::*;

    #[test]
    fn vocabulary_matches_and_captures() {
        let reg = registry().expect("registry");
        let m = reg
            .find(r##"I type "hunter2" into "#password""##)
            .expect("match");
        assert_eq!(m.captures, vec!["hunter2", "#password"]);
        assert_eq!(m.retry, RetryMode::Never);

        let m = reg.find(r##"I wait to see "#dashboard""##).expect("match");
        assert_eq!(m.retry, RetryMode::RunDefault);

        assert!(reg.find("I do something else entirely").is_none());
    }
}
