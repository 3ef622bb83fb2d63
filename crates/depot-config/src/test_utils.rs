/// Runs `f` with the given environment overrides, restoring previous values afterwards.
///
/// Callers must serialize tests that use it since the environment is process-wide.
pub fn with_env<F>(overrides: &[(&str, &str)], f: F)
where
    F: FnOnce(),
{
    let saved: Vec<(String, Option<String>)> = overrides
        .iter()
        .map(|(key, value)| {
            let previous = std::env::var(key).ok();
            std::env::set_var(key, value);
            (key.to_string(), previous)
        })
        .collect();

    f();

    for (key, previous) in saved {
        match previous {
            Some(value) => std::env::set_var(&key, value),
            None => std::env::remove_var(&key),
        }
    }
}
