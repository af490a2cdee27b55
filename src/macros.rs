// (c) Copyright 2025 Helsing GmbH. All rights reserved.
/// Convenience macro for creating a [`Record`](crate::Record) literal.
///
/// Keys are anything that converts into a `String`, values anything that converts into a
/// [`Value`](crate::Value). A later entry for the same key replaces an earlier one.
///
/// ```rust
/// # use deltatx::record;
/// let philosopher = record! {
///     "name" => "Rene",
///     "surname" => "Descartes",
///     "born" => 1596,
/// };
/// assert_eq!(philosopher.len(), 3);
/// assert_eq!(philosopher.get("born").unwrap(), &1596);
/// ```
#[macro_export]
macro_rules! record {
    () => {
        $crate::Record::new()
    };
    ($($k:expr => $v:expr),+ $(,)?) => {
        {
            let mut record = $crate::Record::new();
            $( record.insert($k, $v); )+
            record
        }
    };
}
