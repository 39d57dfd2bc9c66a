
/// Returns the id of the calling execution unit, never 0.
///
/// An execution unit is a thread, or a chain of threads where each one started after
/// the previous one exited and reuses its thread-local storage. Such threads are
/// ordered by happens-before, so a lock may be released by a later member of the chain.
///
/// 0 is the "no owner" marker of [`ReentrantLock`](crate::lock::ReentrantLock).
#[inline(always)]
pub(crate) fn execution_unit_id() -> usize {
    thread_local!(static MARKER: u8 = const { 0 });
    MARKER.with(|marker| {
        let marker: *const u8 = marker;
        marker as usize
    })
}
