/*
    REFERENCES
    ----------

    1. https://github.com/emarsden/dash-mpd-rs/blob/7e985069fd95fd5d9993b7610c28228d2448aea7/src/fetch.rs#L1422-L1460

*/

use regex::Regex;
use std::collections::HashMap;

/// Resolves `$RepresentationID$` and `$Time$` identifiers in segment url
/// templates, including the `%0Nd` width forms. These two are the only
/// identifiers this catalog's manifests use, `$Number$` addressing is not
/// part of the format.
pub(super) struct Template {
    re_representation_id: Regex,
    re_time: Regex,
    vars: HashMap<String, String>,
}

impl Template {
    pub(super) const REPRESENTATION_ID: &'static str = "RepresentationID";
    pub(super) const TIME: &'static str = "Time";

    pub(super) fn new(representation_id: &str) -> Self {
        Self {
            re_representation_id: Regex::new("\\$RepresentationID%0([\\d])d\\$").unwrap(),
            re_time: Regex::new("\\$Time%0([\\d])d\\$").unwrap(),
            vars: HashMap::from([(
                Self::REPRESENTATION_ID.to_owned(),
                representation_id.to_owned(),
            )]),
        }
    }

    pub(super) fn insert(&mut self, var: &str, val: String) {
        self.vars.insert(var.to_owned(), val);
    }

    pub(super) fn resolve(&self, template: &str) -> String {
        let mut template = template.to_owned();

        for (var, ident_re) in [
            (Self::REPRESENTATION_ID, &self.re_representation_id),
            (Self::TIME, &self.re_time),
        ] {
            let ident = format!("${var}$");

            if template.contains(&ident) {
                if let Some(value) = self.vars.get(var) {
                    template = template.replace(&ident, value);
                }
            }

            if let Some(cap) = ident_re.captures(&template) {
                if let Some(value) = self.vars.get(var) {
                    let count = format!(
                        "{:0>width$}",
                        value,
                        width = cap[1].parse::<usize>().unwrap()
                    );
                    let m = ident_re.find(&template).unwrap();
                    template = template[..m.start()].to_owned() + &count + &template[m.end()..];
                }
            }
        }

        template
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_are_substituted() {
        let mut template = Template::new("2880000");
        template.insert(Template::TIME, "36000".to_owned());

        assert_eq!(
            template.resolve("dash/$RepresentationID$/$Time$.m4s"),
            "dash/2880000/36000.m4s"
        );
    }

    #[test]
    fn width_forms_are_zero_padded() {
        let mut template = Template::new("128000");
        template.insert(Template::TIME, "900".to_owned());

        assert_eq!(
            template.resolve("seg-$Time%08d$.m4s"),
            "seg-00000900.m4s"
        );
    }

    #[test]
    fn unknown_identifiers_are_left_alone() {
        let template = Template::new("128000");

        assert_eq!(
            template.resolve("seg-$Number$.m4s"),
            "seg-$Number$.m4s"
        );
    }
}
