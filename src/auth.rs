use std::sync::Arc;
use tokio::sync::watch;

/// Shared sign-in state. Services hold a clone and consult it before every
/// persistent operation; the evaluator loop watches it so a sign-out stops
/// work mid-flight.
#[derive(Clone)]
pub struct AuthState {
    tx: Arc<watch::Sender<Option<String>>>,
}

impl AuthState {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn sign_in(&self, user_id: impl Into<String>) {
        self.tx.send_replace(Some(user_id.into()));
    }

    pub fn sign_out(&self) {
        self.tx.send_replace(None);
    }

    /// The signed-in user id, if any.
    pub fn current_user(&self) -> Option<String> {
        self.tx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<String>> {
        self.tx.subscribe()
    }
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_signed_out() {
        assert_eq!(AuthState::new().current_user(), None);
    }

    #[test]
    fn sign_in_and_out_are_visible_to_clones() {
        let auth = AuthState::new();
        let clone = auth.clone();
        auth.sign_in("u-1");
        assert_eq!(clone.current_user(), Some("u-1".to_string()));
        clone.sign_out();
        assert_eq!(auth.current_user(), None);
    }

    #[tokio::test]
    async fn watchers_observe_transitions() {
        let auth = AuthState::new();
        let mut rx = auth.watch();
        auth.sign_in("u-2");
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().as_deref(), Some("u-2"));
    }
}
