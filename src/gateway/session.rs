//! 会话目录
//!
//! ChatIdentity -> Provider 侧 Thread 句柄的映射。首条消息时惰性创建，默认永不过期；
//! 可选空闲 TTL。同一身份的 get-or-create 串行执行，保证同一时刻至多一个 Thread。

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};

use crate::core::BridgeError;

/// Provider 返回的会话线程句柄（内容由 Provider 持有，这里只存引用）
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ThreadHandle(pub String);

impl ThreadHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ThreadHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

struct ThreadEntry {
    thread: ThreadHandle,
    last_active: Instant,
}

impl ThreadEntry {
    fn is_expired(&self, ttl: Option<Duration>) -> bool {
        ttl.is_some_and(|ttl| self.last_active.elapsed() > ttl)
    }
}

/// 每个身份一个槽位；槽位锁住期间完成「查找或创建」
type Slot = Arc<Mutex<Option<ThreadEntry>>>;

/// 会话目录：由编排器持有并注入，不使用全局状态
pub struct SessionDirectory {
    slots: RwLock<HashMap<String, Slot>>,
    /// 空闲超时；None 表示进程生命周期内不过期
    idle_ttl: Option<Duration>,
}

impl SessionDirectory {
    pub fn new(idle_ttl: Option<Duration>) -> Self {
        Self {
            slots: RwLock::new(HashMap::new()),
            idle_ttl,
        }
    }

    /// 获取身份对应的 Thread；不存在（或已过期）时调用 create 创建并记录。
    /// create 失败时原样返回错误，不缓存失败结果。
    pub async fn get_or_create<F, Fut>(
        &self,
        identity: &str,
        create: F,
    ) -> Result<ThreadHandle, BridgeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<ThreadHandle, BridgeError>>,
    {
        let (slot, mut entry) = self.lock_slot(identity).await;

        if let Some(existing) = entry.as_mut() {
            if !existing.is_expired(self.idle_ttl) {
                existing.last_active = Instant::now();
                return Ok(existing.thread.clone());
            }
            tracing::info!(identity, thread = %existing.thread, "session idle past ttl, starting new thread");
        }

        let thread = match create().await {
            Ok(thread) => thread,
            Err(e) => {
                if entry.is_none() {
                    let mut slots = self.slots.write().await;
                    if slots.get(identity).is_some_and(|s| Arc::ptr_eq(s, &slot)) {
                        slots.remove(identity);
                    }
                }
                return Err(e);
            }
        };
        tracing::info!(identity, thread = %thread, "created assistant thread");
        *entry = Some(ThreadEntry {
            thread: thread.clone(),
            last_active: Instant::now(),
        });
        Ok(thread)
    }

    /// 查询已记录的 Thread（不创建、不刷新活跃时间）
    pub async fn get(&self, identity: &str) -> Option<ThreadHandle> {
        let slot = self.slots.read().await.get(identity).cloned()?;
        let entry = slot.lock().await;
        entry
            .as_ref()
            .filter(|e| !e.is_expired(self.idle_ttl))
            .map(|e| e.thread.clone())
    }

    /// 清理过期会话，返回清理数量
    pub async fn cleanup_expired(&self) -> usize {
        let Some(ttl) = self.idle_ttl else {
            return 0;
        };
        let mut slots = self.slots.write().await;
        let before = slots.len();
        // 移除与 lock_slot 的登记检查都在目录锁下进行，已取得旧槽位的调用方会改用新槽位
        slots.retain(|_, slot| match slot.try_lock() {
            Ok(entry) => entry
                .as_ref()
                .is_some_and(|e| e.last_active.elapsed() <= ttl),
            // 正在 get-or-create 的槽位保留
            Err(_) => true,
        });
        before - slots.len()
    }

    /// 已绑定 Thread 的身份数（创建失败留下的空槽位不计）
    pub async fn len(&self) -> usize {
        let slots: Vec<Slot> = self.slots.read().await.values().cloned().collect();
        let mut bound = 0;
        for slot in slots {
            if slot.lock().await.is_some() {
                bound += 1;
            }
        }
        bound
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// 锁住身份当前登记在目录中的槽位；锁到的槽位已被移除时重新获取
    async fn lock_slot(&self, identity: &str) -> (Slot, OwnedMutexGuard<Option<ThreadEntry>>) {
        loop {
            let slot = self.slot(identity).await;
            let entry = Arc::clone(&slot).lock_owned().await;
            let current = self
                .slots
                .read()
                .await
                .get(identity)
                .is_some_and(|s| Arc::ptr_eq(s, &slot));
            if current {
                return (slot, entry);
            }
        }
    }

    async fn slot(&self, identity: &str) -> Slot {
        if let Some(slot) = self.slots.read().await.get(identity) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(identity.to_string()).or_default())
    }
}

impl Default for SessionDirectory {
    fn default() -> Self {
        Self::new(None)
    }
}
