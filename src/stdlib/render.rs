//! Renders a [`Value`] the way `say`/`warn`/string-interpolation/`str.str`
//! display it: numbers without a spurious trailing `.0`, strings verbatim,
//! lists as `{a, b, c}`, cycles as `{...}`.

use crate::object::Heap;
use crate::value::Value;

pub fn to_display_string(heap: &Heap, v: Value) -> String {
  let mut seen = Vec::new();
  render(heap, v, &mut seen)
}

fn render(heap: &Heap, v: Value, seen: &mut Vec<u32>) -> String {
  if let Some(n) = v.as_number() {
    return render_number(n);
  }
  if v.is_nil() {
    return "nil".to_string();
  }
  if let Some(idx) = v.as_str_index() {
    return heap.strings.get(idx).map(|s| s.as_str_lossy().into_owned()).unwrap_or_default();
  }
  if let Some(idx) = v.as_list_index() {
    if seen.contains(&idx) {
      return "{...}".to_string();
    }
    seen.push(idx);
    let items = heap.lists.get(idx).map(|l| l.as_slice().to_vec()).unwrap_or_default();
    let parts: Vec<String> = items.iter().map(|&item| render(heap, item, seen)).collect();
    seen.pop();
    return format!("{{{}}}", parts.join(", "));
  }
  "nil".to_string()
}

fn render_number(n: f64) -> String {
  if n.is_nan() {
    return "nan".to_string();
  }
  if n.is_infinite() {
    return if n > 0.0 { "inf".to_string() } else { "-inf".to_string() };
  }
  if n == n.trunc() && n.abs() < 1e15 {
    format!("{n:.0}")
  } else {
    format!("{n}")
  }
}
