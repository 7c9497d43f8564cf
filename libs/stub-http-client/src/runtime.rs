use std::future::Future;

/// Drive `future` to completion on a fresh current-thread runtime.
///
/// For synchronous test harnesses. Clients must be created inside `future`,
/// since their dispatch worker lives on the runtime that built them and this
/// runtime is dropped on return.
///
/// # Errors
/// Returns the I/O error if the runtime cannot be started.
///
/// # Panics
/// Panics when called from within an async context.
pub fn run_blocking<F: Future>(future: F) -> std::io::Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    Ok(runtime.block_on(future))
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_run_blocking_returns_output() {
        let value = run_blocking(async {
            tokio::time::sleep(Duration::from_millis(1)).await;
            21 * 2
        })
        .unwrap();
        assert_eq!(value, 42);
    }
}
