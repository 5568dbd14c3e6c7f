use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use actix::Recipient;
use chrono::Utc;
use dashmap::DashMap;

use super::session::{CloseSession, SendText};

/// Opaque per-connection token minted by [`ConnectionRegistry::connect`] and
/// handed back to [`ConnectionRegistry::lookup_by_handle`]. Stands in for the
/// raw transport handle — actix's `Recipient` is type-erased and not a
/// reliable map key across versions, so the registry mints its own identity
/// instead of keying directly off the recipient.
pub type Handle = u64;

struct Connection {
    handle: Handle,
    addr: Recipient<SendText>,
    close: Recipient<CloseSession>,
    account_id: i64,
    client_type: String,
    last_activity: AtomicI64,
}

/// In-memory map of live WebSocket sessions, keyed by `connection_id`.
/// Shared across the WS accept path, the idle sweeper, the outbound
/// dispatcher, and the event broadcaster via `Arc`. `DashMap` gives lock-free
/// concurrent access across those four call sites without a single coarse
/// mutex serializing unrelated connections.
#[derive(Default)]
pub struct ConnectionRegistry {
    by_id: DashMap<String, Connection>,
    by_handle: DashMap<Handle, String>,
    next_handle: AtomicU64,
}

impl ConnectionRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers `id` with its transport handle and `client_type`. If a
    /// connection already occupies `id`, the prior handle is closed before
    /// the new one is installed. Returns the minted handle token for
    /// [`lookup_by_handle`](Self::lookup_by_handle).
    pub fn connect(&self, id: String, client_type: String, account_id: i64, addr: Recipient<SendText>, close: Recipient<CloseSession>) -> Handle {
        if let Some((_, prev)) = self.by_id.remove(&id) {
            self.by_handle.remove(&prev.handle);
            let _ = prev.close.do_send(CloseSession { code: 1000, reason: "replaced".to_string() });
        }

        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.by_handle.insert(handle, id.clone());
        self.by_id.insert(
            id,
            Connection {
                handle,
                addr,
                close,
                account_id,
                client_type,
                last_activity: AtomicI64::new(Utc::now().timestamp()),
            },
        );
        handle
    }

    pub fn disconnect(&self, id: &str) {
        if let Some((_, conn)) = self.by_id.remove(id) {
            self.by_handle.remove(&conn.handle);
        }
    }

    pub fn update_activity(&self, id: &str) {
        if let Some(conn) = self.by_id.get(id) {
            conn.last_activity.store(Utc::now().timestamp(), Ordering::Relaxed);
        }
    }

    pub fn get_account_id(&self, id: &str) -> Option<i64> {
        self.by_id.get(id).map(|c| c.account_id)
    }

    pub fn get_type(&self, id: &str) -> Option<String> {
        self.by_id.get(id).map(|c| c.client_type.clone())
    }

    /// Resolves a handle minted by [`connect`](Self::connect) back to its
    /// current `connection_id`, or `None` if that connection has since
    /// disconnected.
    pub fn lookup_by_handle(&self, handle: Handle) -> Option<String> {
        self.by_handle.get(&handle).map(|id| id.clone())
    }

    /// Sends a frame to one connection by id. Removes the entry and returns
    /// `false` if the recipient's mailbox has already closed.
    pub fn send(&self, id: &str, frame_json: String) -> bool {
        let Some(conn) = self.by_id.get(id) else { return false };
        if conn.addr.try_send(SendText(frame_json)).is_ok() {
            true
        } else {
            drop(conn);
            self.remove(id);
            false
        }
    }

    /// Sends a frame to every connection owned by `account_id`. Returns the
    /// number of sessions it was delivered to.
    pub fn send_by_account(&self, account_id: i64, frame_json: &str) -> usize {
        let mut dead = Vec::new();
        let mut count = 0;
        for entry in self.by_id.iter() {
            if entry.account_id != account_id {
                continue;
            }
            if entry.addr.try_send(SendText(frame_json.to_string())).is_ok() {
                count += 1;
            } else {
                dead.push(entry.key().clone());
            }
        }
        for id in dead {
            self.remove(&id);
        }
        count
    }

    /// Sends a frame to every live session, or only those of `client_type`
    /// when given. Returns the number delivered to.
    pub fn broadcast(&self, client_type: Option<&str>, frame_json: &str) -> usize {
        let mut dead = Vec::new();
        let mut count = 0;
        for entry in self.by_id.iter() {
            if let Some(t) = client_type {
                if entry.client_type != t {
                    continue;
                }
            }
            if entry.addr.try_send(SendText(frame_json.to_string())).is_ok() {
                count += 1;
            } else {
                dead.push(entry.key().clone());
            }
        }
        for id in dead {
            self.remove(&id);
        }
        count
    }

    /// Returns the ids of connections idle longer than `idle_timeout_sec`,
    /// for the sweeper to close.
    pub fn idle_connections(&self, idle_timeout_sec: i64) -> Vec<String> {
        let now = Utc::now().timestamp();
        self.by_id
            .iter()
            .filter(|entry| now - entry.last_activity.load(Ordering::Relaxed) > idle_timeout_sec)
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn close_idle(&self, id: &str, code: u16, reason: &str) {
        if let Some((_, conn)) = self.by_id.remove(id) {
            self.by_handle.remove(&conn.handle);
            let _ = conn.close.do_send(CloseSession { code, reason: reason.to_string() });
        }
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    fn remove(&self, id: &str) {
        if let Some((_, conn)) = self.by_id.remove(id) {
            self.by_handle.remove(&conn.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix::{Actor, Context, Handler};

    struct Echo;

    impl Actor for Echo {
        type Context = Context<Self>;
    }

    impl Handler<SendText> for Echo {
        type Result = ();
        fn handle(&mut self, _msg: SendText, _ctx: &mut Self::Context) {}
    }

    impl Handler<CloseSession> for Echo {
        type Result = ();
        fn handle(&mut self, _msg: CloseSession, _ctx: &mut Self::Context) {}
    }

    fn handles() -> (Recipient<SendText>, Recipient<CloseSession>) {
        let addr = Echo.start();
        (addr.clone().recipient(), addr.recipient())
    }

    #[actix::test]
    async fn connect_registers_type_and_account() {
        let registry = ConnectionRegistry::new();
        let (addr, close) = handles();
        registry.connect("c1".to_string(), "mobile".to_string(), 7, addr, close);

        assert_eq!(registry.get_account_id("c1"), Some(7));
        assert_eq!(registry.get_type("c1"), Some("mobile".to_string()));
        assert_eq!(registry.len(), 1);
    }

    #[actix::test]
    async fn lookup_by_handle_resolves_back_to_id() {
        let registry = ConnectionRegistry::new();
        let (addr, close) = handles();
        let handle = registry.connect("c2".to_string(), "web".to_string(), 1, addr, close);

        assert_eq!(registry.lookup_by_handle(handle), Some("c2".to_string()));
        assert_eq!(registry.lookup_by_handle(handle + 1), None);
    }

    #[actix::test]
    async fn disconnect_removes_entry_and_its_handle() {
        let registry = ConnectionRegistry::new();
        let (addr, close) = handles();
        let handle = registry.connect("c3".to_string(), "web".to_string(), 1, addr, close);

        registry.disconnect("c3");
        assert!(registry.is_empty());
        assert_eq!(registry.lookup_by_handle(handle), None);
    }

    #[actix::test]
    async fn connect_replacing_same_id_drops_the_old_handle() {
        let registry = ConnectionRegistry::new();
        let (addr1, close1) = handles();
        let first = registry.connect("c4".to_string(), "web".to_string(), 1, addr1, close1);

        let (addr2, close2) = handles();
        registry.connect("c4".to_string(), "web".to_string(), 1, addr2, close2);

        assert_eq!(registry.lookup_by_handle(first), None);
        assert_eq!(registry.len(), 1);
    }

    #[actix::test]
    async fn broadcast_filters_by_client_type() {
        let registry = ConnectionRegistry::new();
        let (a1, c1) = handles();
        let (a2, c2) = handles();
        registry.connect("mobile-1".to_string(), "mobile".to_string(), 1, a1, c1);
        registry.connect("web-1".to_string(), "web".to_string(), 2, a2, c2);

        assert_eq!(registry.broadcast(Some("mobile"), "{}"), 1);
        assert_eq!(registry.broadcast(None, "{}"), 2);
    }

    #[actix::test]
    async fn idle_connections_reports_entries_past_timeout() {
        let registry = ConnectionRegistry::new();
        let (addr, close) = handles();
        registry.connect("idle-1".to_string(), "web".to_string(), 1, addr, close);
        registry.by_id.get("idle-1").unwrap().last_activity.store(0, Ordering::Relaxed);

        assert_eq!(registry.idle_connections(30), vec!["idle-1".to_string()]);
        assert_eq!(registry.idle_connections(i64::MAX), Vec::<String>::new());
    }
}
