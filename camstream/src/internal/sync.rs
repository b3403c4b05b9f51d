use std::sync::{Mutex, MutexGuard, PoisonError};

/// 获取锁；持锁线程 panic 过也继续使用内部数据。
///
/// 被保护的数据都是整体替换 (帧、时间戳、Map 条目)，不存在半更新状态，
/// 因此忽略 poison 是安全的。
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
