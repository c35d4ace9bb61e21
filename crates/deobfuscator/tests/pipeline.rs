use deobfuscator::{deobfuscate, Config, Outcome, TransformationKey, MAX_ITERATIONS};
use deobfuscator_swc_runner::test_utils::strip_code_whitespace;
use indoc::indoc;
use pretty_assertions::assert_eq;

const OBFUSCATED: &str = indoc! {r#"
  function table() {
    var strings = ["log", "Hello", "console"];
    table = function () {
      return strings;
    };
    return table();
  }
  function wrapper(a, b) {
    var strings = table();
    wrapper = function (index, key) {
      index = index - 0x64;
      var value = strings[index];
      return value;
    };
    return wrapper(a, b);
  }
  function main() {
    var o = {
      "abc": function (f, x) {
        return f(x);
      },
      "def": 0x64,
    };
    var s = "1|0".split("|"), c = 0;
    while (!![]) {
      switch (s[c++]) {
        case "0":
          o.abc(window[wrapper(0x66)][wrapper(o.def)], wrapper(0x65));
          continue;
        case "1":
          var unused = 1 + 2;
          continue;
      }
      break;
    }
  }
  main();
"#};

const UNMATCHED_ROTATION: &str = indoc! {r#"
  function table() {
    var strings = ["foo", "bar", "baz"];
    table = function () {
      return strings;
    };
    return table();
  }
  function wrapper(a, b) {
    var strings = table();
    wrapper = function (index, key) {
      index = index - 0x64;
      var value = strings[index];
      return value;
    };
    return wrapper(a, b);
  }
  (function (t, stop) {
    var s = t();
    while (true) {
      try {
        var v = parseInt(wrapper(0x64)) + 1;
        if (v === stop) break;
        else s.push(s.shift());
      } catch (e) {
        s.push(s.shift());
      }
    }
  })(table, 4);
  f(wrapper(100));
"#};

#[test]
fn test_deobfuscates_layered_sample() {
  let output = deobfuscate(OBFUSCATED, &Config::default()).unwrap();
  let code = strip_code_whitespace(&output.code);

  assert!(code.contains(r#"window.console.log("Hello")"#), "{}", output.code);
  for leftover in ["wrapper", "table", "switch", "unused", "abc"] {
    assert!(!code.contains(leftover), "{} in {}", leftover, output.code);
  }
  assert!(output.diagnostics.iter().any(|diagnostic| {
    diagnostic.transformation == TransformationKey::StringRevealing
      && matches!(&diagnostic.outcome, Outcome::Matched(message) if message.starts_with("Revealed"))
  }));
}

#[test]
fn test_output_is_a_fixed_point() {
  let samples = [
    OBFUSCATED,
    UNMATCHED_ROTATION,
    "var a = 5; f(a); g(a);",
    r#"if (true) { a(); } else { b(); } x["y"] = !0;"#,
  ];

  for sample in samples {
    let first = deobfuscate(sample, &Config::default()).unwrap();
    let second = deobfuscate(&first.code, &Config::default()).unwrap();
    assert_eq!(second.code, first.code);
    assert_eq!(second.iterations, 1, "second run changed:\n{}", first.code);
  }
}

#[test]
fn test_unmatched_rotation_terminates() {
  let output = deobfuscate(UNMATCHED_ROTATION, &Config::default()).unwrap();

  assert!(output.iterations <= MAX_ITERATIONS);
  assert!(output.code.contains("wrapper(100)"));
  assert!(output.diagnostics.iter().any(|diagnostic| {
    diagnostic.transformation == TransformationKey::StringRevealing
      && matches!(diagnostic.outcome, Outcome::Failed(_))
  }));
}

#[test]
fn test_disabled_pass_does_not_run() {
  let mut config = Config::default();
  config.disable(TransformationKey::StringRevealing);

  let output = deobfuscate(OBFUSCATED, &config).unwrap();
  assert!(output.code.contains("wrapper("));
  assert!(output
    .diagnostics
    .iter()
    .all(|diagnostic| diagnostic.transformation != TransformationKey::StringRevealing));
}

#[test]
fn test_config_map_is_authoritative() {
  let config = Config::from_json(r#"{ "deadBranchRemoval": { "isEnabled": true } }"#).unwrap();

  let output = deobfuscate(
    "var a = 5; if (true) { f(a); } else { g(a); }",
    &config,
  )
  .unwrap();
  assert_eq!(strip_code_whitespace(&output.code), "vara=5;f(a);");
}

#[test]
fn test_diagnostics_serialize_with_pass_key() {
  let output = deobfuscate(OBFUSCATED, &Config::default()).unwrap();
  let json = serde_json::to_value(&output.diagnostics).unwrap();

  let first = &json[0];
  assert!(first["transformation"].is_string());
  assert!(["matched", "skipped", "failed"].contains(&first["outcome"].as_str().unwrap()));
  assert!(first["message"].is_string());
}
