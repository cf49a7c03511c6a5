use crate::Value;
use std::fmt::Write;

#[macro_export]
macro_rules! truncate_long {
    ($query:expr) => {
        format_args!(
            "{}{}",
            &$query[..$crate::floor_char_boundary(&$query, 497)].trim_end(),
            if $query.len() > 497 { "..." } else { "" },
        )
    };
}

/// Largest char boundary of `value` not past `index`.
pub fn floor_char_boundary(value: &str, index: usize) -> usize {
    if index >= value.len() {
        return value.len();
    }
    (0..=index)
        .rev()
        .find(|i| value.is_char_boundary(*i))
        .unwrap_or_default()
}

/// Renders bound parameters for diagnostics, `[1, 'abc', NULL]`.
pub fn printable_params(params: &[Value]) -> String {
    let mut out = String::with_capacity(2 + params.len() * 8);
    out.push('[');
    separated_by(&mut out, params, |out, v| {
        let _ = write!(out, "{}", v);
    }, ", ");
    out.push(']');
    out
}

pub fn separated_by<T, F>(
    out: &mut String,
    values: impl IntoIterator<Item = T>,
    mut f: F,
    separator: &str,
) where
    F: FnMut(&mut String, T),
{
    let mut len = out.len();
    for v in values {
        if out.len() > len {
            out.push_str(separator);
        }
        len = out.len();
        f(out, v);
    }
}
