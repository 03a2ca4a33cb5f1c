
/// Returns a token identifying the calling thread.
///
/// The token is the address of a thread-local and is therefore never 0, which leaves 0
/// free to mean "no owner".
///
/// Two live threads never share a token. A thread that starts after another one has
/// terminated may observe the token of the terminated thread. A [`Padlock`] whose
/// owner terminated while holding it would then appear to be held by the new thread.
/// This is only possible if an [`Acquisition`] was leaked, since acquisitions cannot
/// leave their thread.
///
/// [`Padlock`]: crate::Padlock
/// [`Acquisition`]: crate::Acquisition
#[inline(always)]
pub(crate) fn current_owner() -> usize {
    thread_local!(static OWNER_TOKEN: u8 = const { 0 });
    OWNER_TOKEN.with(|token| {
        let token: *const u8 = token;
        token as usize
    })
}
