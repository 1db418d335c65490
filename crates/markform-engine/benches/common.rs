// Benchmark helper functions - Rust's dead code analysis doesn't understand
// that these are used by benchmark files in the same directory
// See: https://users.rust-lang.org/t/cargo-rustc-benches-awarnings/110111/2
#[allow(dead_code)]
pub fn generate_form(groups: usize, fields_per_group: usize) -> String {
    let mut content = String::from("---\ntitle: Benchmark\n---\n\n{% form id=\"bench\" %}\n\n");

    for g in 0..groups {
        content.push_str(&format!("{{% group id=\"g{g}\" title=\"Group {g}\" %}}\n\n"));
        for f in 0..fields_per_group {
            content.push_str(&field(g, f));
            content.push_str("\n\n");
        }
        content.push_str("{% /group %}\n\n");
    }

    content.push_str("{% /form %}\n");
    content
}

fn field(group: usize, index: usize) -> String {
    let id = format!("f{group}_{index}");
    match index % 4 {
        0 => format!(
            "{{% field kind=\"string\" id=\"{id}\" label=\"Text {index}\" %}}\n```value\nSome answer\nwith two lines\n```\n{{% /field %}}"
        ),
        1 => format!(
            "{{% field kind=\"number\" id=\"{id}\" label=\"Number {index}\" min=0 %}}\n```value\n{index}\n```\n{{% /field %}}"
        ),
        2 => format!(
            "{{% field kind=\"checkboxes\" id=\"{id}\" label=\"Tasks {index}\" %}}\n- [x] One {{% #one %}}\n- [/] Two {{% #two %}}\n- [ ] Three {{% #three %}}\n{{% /field %}}"
        ),
        _ => format!(
            "{{% field kind=\"table\" id=\"{id}\" label=\"Table {index}\" columnIds=[\"name\", \"age\"] columnTypes=[\"string\", \"number\"] %}}\n| Name | Age |\n| --- | --- |\n| Ada | 36 |\n| Bob | %SKIP% (unknown) |\n{{% /field %}}"
        ),
    }
}
