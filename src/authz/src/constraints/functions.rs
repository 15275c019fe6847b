//! Fixed predicate library
//!
//! Names, arities, and coercion rules are a wire-level compatibility
//! contract with existing constraint text. Predicate misuse (wrong arity,
//! unparseable operands) degrades to `false`; only malformed template text
//! is an error, and that is caught at parse time.

use super::value::Value;
use chrono::Local;
use ipnet::IpNet;
use std::net::IpAddr;

/// Mean Earth radius, kilometers
const EARTH_RADIUS_KM: f64 = 6371.0;

const KNOWN: &[&str] = &[
    "and",
    "or",
    "LT",
    "LE",
    "EQ",
    "GT",
    "GE",
    "Nth",
    "Not",
    "True",
    "BeginsWith",
    "EndsWith",
    "Contains",
    "Includes",
    "HasRole",
    "HasGroup",
    "HasRelation",
    "ActionIncludes",
    "TimeNow",
    "TimeInRange",
    "StringToFloatArray",
    "DistanceWithinKM",
    "IPInRange",
    "IsLoopback",
    "IsMulticast",
];

/// Whether `name` is a registered predicate or builtin
pub fn is_known(name: &str) -> bool {
    KNOWN.contains(&name)
}

/// Apply a predicate to already-evaluated arguments. `root` is the full
/// evaluation context; membership predicates read their sections from it.
pub fn apply(name: &str, args: &[Value], root: &Value) -> Value {
    match name {
        "and" => Value::Bool(args.iter().all(Value::truthy)),
        "or" => Value::Bool(args.iter().any(Value::truthy)),

        "LT" => compare(args, |a, b| a < b),
        "LE" => compare(args, |a, b| a <= b),
        "EQ" => compare(args, |a, b| a == b),
        "GT" => compare(args, |a, b| a > b),
        "GE" => compare(args, |a, b| a >= b),

        "Nth" => match args {
            [a, b] => {
                let divisor = b.as_i64();
                Value::Bool(divisor != 0 && a.as_i64() % divisor == 0)
            }
            _ => Value::Bool(false),
        },

        "Not" => Value::Bool(!args.first().map(Value::truthy).unwrap_or(false)),
        "True" => Value::Bool(args.first().map(Value::truthy).unwrap_or(false)),

        "BeginsWith" => string_pair(args, |s, p| s.starts_with(p)),
        "EndsWith" => string_pair(args, |s, p| s.ends_with(p)),
        "Contains" => string_pair(args, |s, p| s.contains(p)),

        "Includes" => match args {
            [collection, item] => Value::Bool(includes(collection, &item.render())),
            _ => Value::Bool(false),
        },

        "HasRole" => membership(root, &["Principal", "Roles"], args),
        "HasGroup" => membership(root, &["Principal", "Groups"], args),

        "HasRelation" => match args {
            [name] => {
                let relations = root.lookup(&[String::from("Relations")]);
                match relations {
                    Value::Map(map) => Value::Bool(map.contains_key(&name.render())),
                    _ => Value::Bool(false),
                }
            }
            _ => Value::Bool(false),
        },

        "ActionIncludes" => {
            let action = root
                .lookup(&[String::from("Principal"), String::from("Action")])
                .render();
            Value::Bool(!action.is_empty() && args.iter().any(|a| a.render() == action))
        }

        "TimeNow" => match args {
            [layout] => Value::Str(
                Local::now()
                    .format(&go_layout_to_chrono(&layout.render()))
                    .to_string(),
            ),
            _ => Value::Bool(false),
        },

        "TimeInRange" => match args {
            [current, start, end] => Value::Bool(time_in_range(
                &current.render(),
                &start.render(),
                &end.render(),
            )),
            _ => Value::Bool(false),
        },

        "StringToFloatArray" => match args {
            [s] => Value::Seq(
                parse_floats(&s.render())
                    .into_iter()
                    .map(Value::Num)
                    .collect(),
            ),
            _ => Value::Bool(false),
        },

        "DistanceWithinKM" => match args {
            [p1, p2, within] => {
                let within_km = within.as_f64();
                Value::Bool(distance_within_km(&p1.render(), &p2.render(), within_km))
            }
            _ => Value::Bool(false),
        },

        "IPInRange" => match args {
            [ip, cidr] => {
                let parsed_ip = ip.render().parse::<IpAddr>();
                let parsed_net = cidr.render().parse::<IpNet>();
                match (parsed_ip, parsed_net) {
                    (Ok(ip), Ok(net)) => Value::Bool(net.contains(&ip)),
                    _ => Value::Bool(false),
                }
            }
            _ => Value::Bool(false),
        },

        "IsLoopback" => ip_predicate(args, |ip| ip.is_loopback()),
        "IsMulticast" => ip_predicate(args, |ip| ip.is_multicast()),

        // Parse-time validation makes this unreachable
        _ => Value::Bool(false),
    }
}

fn compare(args: &[Value], op: impl Fn(f64, f64) -> bool) -> Value {
    match args {
        [a, b] => Value::Bool(op(a.as_f64(), b.as_f64())),
        _ => Value::Bool(false),
    }
}

fn string_pair(args: &[Value], op: impl Fn(&str, &str) -> bool) -> Value {
    match args {
        [s, p] => Value::Bool(op(&s.render(), &p.render())),
        _ => Value::Bool(false),
    }
}

fn membership(root: &Value, path: &[&str], args: &[Value]) -> Value {
    let wanted = match args {
        [name] => name.render(),
        _ => return Value::Bool(false),
    };
    let path: Vec<String> = path.iter().map(|p| p.to_string()).collect();
    match root.lookup(&path) {
        Value::Seq(items) => Value::Bool(items.iter().any(|item| item.render() == wanted)),
        _ => Value::Bool(false),
    }
}

fn ip_predicate(args: &[Value], op: impl Fn(&IpAddr) -> bool) -> Value {
    match args {
        [ip] => match ip.render().parse::<IpAddr>() {
            Ok(ip) => Value::Bool(op(&ip)),
            Err(_) => Value::Bool(false),
        },
        _ => Value::Bool(false),
    }
}

/// Collection membership: explicit sequences check rendered items, literal
/// strings are split on whitespace/punctuation first
fn includes(collection: &Value, item: &str) -> bool {
    match collection {
        Value::Seq(items) => items.iter().any(|v| v.render() == item),
        Value::Str(s) => split_terms(s).any(|term| term == item),
        _ => false,
    }
}

fn split_terms(s: &str) -> impl Iterator<Item = &str> {
    s.split(|c: char| c.is_whitespace() || matches!(c, ',' | ';' | ':' | '|' | '/'))
        .filter(|term| !term.is_empty())
}

/// Parse a delimiter-separated numeric list; unparseable tokens are dropped
fn parse_floats(s: &str) -> Vec<f64> {
    s.split(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
        .filter(|token| !token.is_empty())
        .filter_map(|token| token.parse().ok())
        .collect()
}

/// Parse a 12-hour `h:mmam` / `h:mm pm` clock string into minutes since
/// midnight
fn parse_clock(s: &str) -> Option<u32> {
    let s = s.trim().to_lowercase();
    let (body, pm) = if let Some(stripped) = s.strip_suffix("am") {
        (stripped.trim(), false)
    } else if let Some(stripped) = s.strip_suffix("pm") {
        (stripped.trim(), true)
    } else {
        return None;
    };

    let (hour_text, minute_text) = body.split_once(':')?;
    let hour: u32 = hour_text.trim().parse().ok()?;
    let minute: u32 = minute_text.trim().parse().ok()?;
    if !(1..=12).contains(&hour) || minute > 59 {
        return None;
    }

    let hour24 = match (hour, pm) {
        (12, false) => 0,
        (12, true) => 12,
        (h, false) => h,
        (h, true) => h + 12,
    };
    Some(hour24 * 60 + minute)
}

/// Compare only hour/minute on the current date. Ranges crossing midnight
/// are not supported.
fn time_in_range(current: &str, start: &str, end: &str) -> bool {
    match (parse_clock(current), parse_clock(start), parse_clock(end)) {
        (Some(current), Some(start), Some(end)) => current >= start && current <= end,
        _ => false,
    }
}

/// Haversine distance between two `"lat,lon"` points. False if the bound is
/// non-positive or either point does not parse to exactly two numbers.
fn distance_within_km(p1: &str, p2: &str, within_km: f64) -> bool {
    if within_km <= 0.0 {
        return false;
    }
    let a = parse_floats(p1);
    let b = parse_floats(p2);
    if a.len() != 2 || b.len() != 2 {
        return false;
    }

    let (lat1, lon1) = (a[0].to_radians(), a[1].to_radians());
    let (lat2, lon2) = (b[0].to_radians(), b[1].to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let distance = 2.0 * EARTH_RADIUS_KM * h.sqrt().asin();
    distance <= within_km
}

/// Translate Go reference-layout tokens to a chrono format string
fn go_layout_to_chrono(layout: &str) -> String {
    const TOKENS: &[(&str, &str)] = &[
        ("2006", "%Y"),
        ("January", "%B"),
        ("Monday", "%A"),
        ("-0700", "%z"),
        ("Jan", "%b"),
        ("Mon", "%a"),
        ("MST", "%Z"),
        ("15", "%H"),
        ("01", "%m"),
        ("02", "%d"),
        ("03", "%I"),
        ("04", "%M"),
        ("05", "%S"),
        ("PM", "%p"),
        ("pm", "%P"),
        ("3", "%-I"),
        ("2", "%-d"),
        ("1", "%-m"),
    ];

    let mut out = String::new();
    let mut rest = layout;
    'outer: while !rest.is_empty() {
        if rest.starts_with('%') {
            out.push_str("%%");
            rest = &rest[1..];
            continue;
        }
        for (token, replacement) in TOKENS {
            if rest.starts_with(token) {
                out.push_str(replacement);
                rest = &rest[token.len()..];
                continue 'outer;
            }
        }
        let ch = rest.chars().next().unwrap_or_default();
        out.push(ch);
        rest = &rest[ch.len_utf8()..];
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn root_with_roles(roles: &[&str]) -> Value {
        let mut principal = BTreeMap::new();
        principal.insert("Roles".to_string(), Value::str_seq(roles.iter().copied()));
        principal.insert("Action".to_string(), Value::Str("read".to_string()));
        let mut root = BTreeMap::new();
        root.insert("Principal".to_string(), Value::Map(principal));
        Value::Map(root)
    }

    fn call(name: &str, args: &[Value]) -> Value {
        apply(name, args, &Value::Null)
    }

    #[test]
    fn test_numeric_comparisons_coerce_to_float() {
        assert_eq!(call("LT", &["3".into(), 4.0.into()]), Value::Bool(true));
        assert_eq!(call("GE", &[4.0.into(), 4.0.into()]), Value::Bool(true));
        assert_eq!(call("EQ", &["21".into(), 21.0.into()]), Value::Bool(true));
        assert_eq!(call("GT", &["x".into(), 1.0.into()]), Value::Bool(false));
        // Wrong arity degrades to false
        assert_eq!(call("LT", &[1.0.into()]), Value::Bool(false));
    }

    #[test]
    fn test_nth() {
        assert_eq!(call("Nth", &[9.0.into(), 3.0.into()]), Value::Bool(true));
        assert_eq!(call("Nth", &[10.0.into(), 3.0.into()]), Value::Bool(false));
        assert_eq!(call("Nth", &[10.0.into(), 0.0.into()]), Value::Bool(false));
    }

    #[test]
    fn test_string_predicates() {
        assert_eq!(
            call("BeginsWith", &["urn:sales".into(), "urn:".into()]),
            Value::Bool(true)
        );
        assert_eq!(
            call("EndsWith", &["report.pdf".into(), ".pdf".into()]),
            Value::Bool(true)
        );
        assert_eq!(
            call("Contains", &["alpha beta".into(), "ha b".into()]),
            Value::Bool(true)
        );
    }

    #[test]
    fn test_includes() {
        let seq = Value::str_seq(["read", "write"]);
        assert_eq!(call("Includes", &[seq.clone(), "write".into()]), Value::Bool(true));
        assert_eq!(call("Includes", &[seq, "delete".into()]), Value::Bool(false));

        // Literal delimited string splits on whitespace/punctuation
        assert_eq!(
            call("Includes", &["read, write; exec".into(), "exec".into()]),
            Value::Bool(true)
        );
        assert_eq!(
            call("Includes", &["read, write".into(), "rea".into()]),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_role_membership_reads_context() {
        let root = root_with_roles(&["manager", "viewer"]);
        assert_eq!(
            apply("HasRole", &["manager".into()], &root),
            Value::Bool(true)
        );
        assert_eq!(
            apply("HasRole", &["admin".into()], &root),
            Value::Bool(false)
        );
        // No Principal section at all
        assert_eq!(
            apply("HasRole", &["manager".into()], &Value::Null),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_action_includes() {
        let root = root_with_roles(&[]);
        assert_eq!(
            apply("ActionIncludes", &["read".into(), "write".into()], &root),
            Value::Bool(true)
        );
        assert_eq!(
            apply("ActionIncludes", &["delete".into()], &root),
            Value::Bool(false)
        );
    }

    #[test]
    fn test_time_in_range() {
        assert!(time_in_range("11:00am", "10:00am", "8:00pm"));
        assert!(!time_in_range("9:00am", "10:00am", "8:00pm"));
        assert!(time_in_range("12:30pm", "12:00pm", "1:00pm"));
        // Midnight-crossing ranges are not supported
        assert!(!time_in_range("11:00pm", "10:00pm", "2:00am"));
        // Garbage degrades to false
        assert!(!time_in_range("eleven", "10:00am", "8:00pm"));
    }

    #[test]
    fn test_clock_parsing() {
        assert_eq!(parse_clock("12:00am"), Some(0));
        assert_eq!(parse_clock("12:00pm"), Some(12 * 60));
        assert_eq!(parse_clock("1:05 PM"), Some(13 * 60 + 5));
        assert_eq!(parse_clock("13:00pm"), None);
        assert_eq!(parse_clock("10:00"), None);
    }

    #[test]
    fn test_distance_within_km() {
        // Seattle Space Needle to Mount Rainier, roughly 86 km
        let p1 = "47.620422,-122.349358";
        let p2 = "46.879967,-121.726906";
        assert!(distance_within_km(p1, p2, 100.0));
        assert!(!distance_within_km(p1, p2, 50.0));
        assert!(!distance_within_km(p1, p2, 0.0));
        assert!(!distance_within_km("47.6", p2, 100.0));
    }

    #[test]
    fn test_ip_predicates() {
        assert_eq!(
            call("IPInRange", &["211.211.211.5".into(), "211.211.211.0/24".into()]),
            Value::Bool(true)
        );
        assert_eq!(
            call("IPInRange", &["211.211.212.5".into(), "211.211.211.0/24".into()]),
            Value::Bool(false)
        );
        assert_eq!(call("IsLoopback", &["127.0.0.1".into()]), Value::Bool(true));
        assert_eq!(call("IsMulticast", &["224.0.0.1".into()]), Value::Bool(true));
        assert_eq!(call("IsMulticast", &["10.0.0.1".into()]), Value::Bool(false));
        assert_eq!(call("IsLoopback", &["not-an-ip".into()]), Value::Bool(false));
    }

    #[test]
    fn test_string_to_float_array() {
        let result = call("StringToFloatArray", &["1.5, 2, -3.25".into()]);
        assert_eq!(
            result,
            Value::Seq(vec![Value::Num(1.5), Value::Num(2.0), Value::Num(-3.25)])
        );
    }

    #[test]
    fn test_go_layout_translation() {
        assert_eq!(go_layout_to_chrono("2006-01-02"), "%Y-%m-%d");
        assert_eq!(go_layout_to_chrono("3:04pm"), "%-I:%M%P");
        assert_eq!(go_layout_to_chrono("Mon Jan 2"), "%a %b %-d");
        assert_eq!(go_layout_to_chrono("15:04:05"), "%H:%M:%S");
    }

    #[test]
    fn test_time_now_formats() {
        let rendered = apply("TimeNow", &["3:04pm".into()], &Value::Null).render();
        assert!(parse_clock(&rendered).is_some(), "got '{}'", rendered);
    }

    #[test]
    fn test_boolean_builtins() {
        assert_eq!(call("Not", &[Value::Bool(true)]), Value::Bool(false));
        assert_eq!(call("True", &["yes".into()]), Value::Bool(true));
        assert_eq!(call("True", &[Value::Null]), Value::Bool(false));
        assert_eq!(
            call("and", &[Value::Bool(true), "yes".into()]),
            Value::Bool(true)
        );
        assert_eq!(
            call("or", &[Value::Bool(false), Value::Num(0.0)]),
            Value::Bool(false)
        );
    }
}
