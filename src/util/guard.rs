//! Panic containment for user closures and futures.
//!
//! Every call into user code made by the interpreter goes through one of
//! these helpers, so a panicking effect becomes an [`Error`] of the given
//! kind instead of unwinding through the scope tree.

use crate::error::{Error, ErrorKind, Result};
use futures_lite::FutureExt;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Calls `f`, converting a panic into an error of `kind`.
pub(crate) fn call<T>(kind: ErrorKind, f: impl FnOnce() -> T) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| Error::from_panic(kind, &*payload))
}

/// Awaits `fut`, converting a panic during any poll into an error of `kind`.
pub(crate) async fn poll<T, F>(kind: ErrorKind, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => Err(Error::from_panic(kind, &*payload)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_passes_values_and_catches_panics() {
        assert_eq!(call(ErrorKind::Panicked, || 3).unwrap(), 3);
        let err = call(ErrorKind::ResourceRelease, || -> i32 { panic!("boom") }).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ResourceRelease);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn poll_catches_panics_inside_futures() {
        let ok = futures_lite::future::block_on(poll(ErrorKind::Panicked, async { Ok(1) }));
        assert_eq!(ok.unwrap(), 1);
        let err = futures_lite::future::block_on(poll(ErrorKind::Panicked, async {
            if true {
                panic!("inside");
            }
            Ok::<_, Error>(())
        }))
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Panicked);
    }
}
