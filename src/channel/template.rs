//! Placeholder substitution for notification lines, subjects and tickers.
//!
//! Recognized placeholders: `{path}`, `{event}`, `{message}`, `{dt}`,
//! `{events}` and `{type}`. `{{` and `}}` produce literal braces. Unknown
//! placeholders are kept as written.

/// Values available to a template.
#[derive(Debug, Default, Clone, Copy)]
pub struct Vars<'a> {
    pub path: &'a str,
    pub event: &'a str,
    pub message: &'a str,
    pub dt: &'a str,
    pub events: &'a str,
    pub channel_type: &'a str,
}

impl<'a> Vars<'a> {
    fn lookup(&self, name: &str) -> Option<&'a str> {
        match name {
            "path" => Some(self.path),
            "event" => Some(self.event),
            "message" => Some(self.message),
            "dt" => Some(self.dt),
            "events" => Some(self.events),
            "type" => Some(self.channel_type),
            _ => None,
        }
    }
}

/// Render `template` with `vars`.
pub fn render(template: &str, vars: &Vars<'_>) -> String {
    let mut out = String::with_capacity(template.len() + 64);
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") {
            out.push('{');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with("}}") {
            out.push('}');
            rest = &tail[2..];
            continue;
        }
        if tail.starts_with('}') {
            out.push('}');
            rest = &tail[1..];
            continue;
        }

        // Opening brace: look for a placeholder name
        match tail[1..].find('}') {
            Some(end) => {
                let name = &tail[1..=end];
                match vars.lookup(name) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(&tail[..=end + 1]),
                }
                rest = &tail[end + 2..];
            }
            None => {
                out.push_str(tail);
                rest = "";
            }
        }
    }

    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars() -> Vars<'static> {
        Vars {
            path: "/data",
            event: "cre",
            message: "CREATED FILE a.txt",
            dt: "2024-01-01 10-00-00",
            events: "cre, mod",
            channel_type: "message",
        }
    }

    #[test]
    fn test_default_format() {
        assert_eq!(
            render("{path} >> {message}", &vars()),
            "/data >> CREATED FILE a.txt"
        );
    }

    #[test]
    fn test_all_placeholders() {
        assert_eq!(
            render("[{dt}] {type}/{event} ({events})", &vars()),
            "[2024-01-01 10-00-00] message/cre (cre, mod)"
        );
    }

    #[test]
    fn test_escaped_and_unknown_braces() {
        assert_eq!(render("{{path}} {nope} }", &vars()), "{path} {nope} }");
        assert_eq!(render("open {path", &vars()), "open {path");
    }
}
