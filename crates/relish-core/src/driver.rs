//! Browser-driver boundary.
//!
//! The runtime never talks to a browser directly; it consumes this trait.
//! Queries report an awaited-condition miss as a plain `Ok(false)`/`None`
//! rather than an error, so retryable step implementations can distinguish
//! "not yet" from "broken" and signal [`EngineError::Recoverable`]
//! themselves.
//!
//! [`EngineError::Recoverable`]: crate::errors::EngineError::Recoverable

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::Result;

#[async_trait]
pub trait Driver: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;
    async fn click(&self, selector: &str) -> Result<()>;
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Whether an element is currently present. `false` means "not yet",
    /// not "broken".
    async fn element_present(&self, selector: &str) -> Result<bool>;

    /// Visible text of an element, or `None` while it is absent.
    async fn element_text(&self, selector: &str) -> Result<Option<String>>;

    /// Visual snapshot attached to failure diagnostics. PNG bytes.
    async fn screenshot(&self) -> Result<Vec<u8>>;
}

/// Opens one isolated session per worker. Sessions are never shared.
#[async_trait]
pub trait DriverFactory: Send + Sync {
    async fn open_session(&self) -> anyhow::Result<Arc<dyn Driver>>;
}

pub mod fake {
    //! Scriptable in-memory driver for tests and dry wiring.

    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;

    use crate::errors::Result;

    use super::{Driver, DriverFactory};

    /// In-memory driver: elements "appear" after a configured number of
    /// `element_present` polls, which is enough to exercise the retry
    /// engine end to end.
    #[derive(Default)]
    pub struct FakeDriver {
        /// selector -> polls remaining before the element reports present.
        appear_after: Mutex<HashMap<String, usize>>,
        texts: Mutex<HashMap<String, String>>,
        calls: AtomicUsize,
    }

    impl FakeDriver {
        pub fn new() -> Self {
            Self::default()
        }

        /// Make `selector` present from the start.
        pub fn with_element(self, selector: &str) -> Self {
            self.appear_after
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(selector.to_string(), 0);
            self
        }

        /// Make `selector` present only after `polls` presence queries.
        pub fn with_element_after(self, selector: &str, polls: usize) -> Self {
            self.appear_after
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(selector.to_string(), polls);
            self
        }

        pub fn with_text(self, selector: &str, text: &str) -> Self {
            self.texts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .insert(selector.to_string(), text.to_string());
            self
        }

        /// Total driver calls made; used to assert a skipped scenario never
        /// touched the driver.
        pub fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn touch(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Driver for FakeDriver {
        async fn navigate(&self, _url: &str) -> Result<()> {
            self.touch();
            Ok(())
        }

        async fn click(&self, _selector: &str) -> Result<()> {
            self.touch();
            Ok(())
        }

        async fn type_text(&self, _selector: &str, _text: &str) -> Result<()> {
            self.touch();
            Ok(())
        }

        async fn element_present(&self, selector: &str) -> Result<bool> {
            self.touch();
            let mut map = self.appear_after.lock().unwrap_or_else(|e| e.into_inner());
            match map.get_mut(selector) {
                Some(0) => Ok(true),
                Some(n) => {
                    *n -= 1;
                    Ok(false)
                }
                None => Ok(false),
            }
        }

        async fn element_text(&self, selector: &str) -> Result<Option<String>> {
            self.touch();
            Ok(self
                .texts
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .get(selector)
                .cloned())
        }

        async fn screenshot(&self) -> Result<Vec<u8>> {
            self.touch();
            // Smallest possible valid-enough payload for tests.
            Ok(vec![0x89, b'P', b'N', b'G'])
        }
    }

    /// Hands every worker its own [`FakeDriver`].
    #[derive(Default)]
    pub struct FakeDriverFactory;

    #[async_trait]
    impl DriverFactory for FakeDriverFactory {
        async fn open_session(&self) -> anyhow::Result<Arc<dyn Driver>> {
            Ok(Arc::new(FakeDriver::new()))
        }
    }
}
