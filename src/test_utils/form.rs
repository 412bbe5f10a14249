use scraper::{ElementRef, Selector};

/// The first `<form>` in `html`.
#[track_caller]
pub(crate) fn must_get_form(html: &scraper::Html) -> ElementRef<'_> {
    let form = Selector::parse("form").unwrap();

    html.select(&form).next().expect("page has no form")
}

#[track_caller]
pub(crate) fn assert_hx_endpoint(form: &ElementRef<'_>, endpoint: &str, attribute: &str) {
    assert_eq!(
        form.value().attr(attribute),
        Some(endpoint),
        "form {attribute} should point at {endpoint}"
    );
}

/// Assert `form` has a required `<input>` called `name` of type `type_`.
#[track_caller]
pub(crate) fn assert_form_input(form: &ElementRef<'_>, name: &str, type_: &str) {
    let selector = Selector::parse(&format!(r#"input[name="{name}"]"#)).unwrap();
    let input = form
        .select(&selector)
        .next()
        .unwrap_or_else(|| panic!("form has no input named {name:?}"));

    assert_eq!(
        input.value().attr("type"),
        Some(type_),
        "input {name:?} has the wrong type"
    );
    assert!(
        input.value().attr("required").is_some(),
        "input {name:?} should be required"
    );
}

#[track_caller]
pub(crate) fn assert_form_submit_button(form: &ElementRef<'_>) {
    let selector = Selector::parse(r#"button[type="submit"]"#).unwrap();

    assert!(
        form.select(&selector).next().is_some(),
        "form has no submit button"
    );
}
