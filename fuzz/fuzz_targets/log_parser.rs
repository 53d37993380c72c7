#![no_main]

use crashscope::analyzer::{analyze, AnalysisConfig};
use crashscope::parser::LogParser;
use crashscope::report::render_to_string;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Logs are decoded lossily, mirror that here
    let text = String::from_utf8_lossy(data);
    if let Ok(parser) = LogParser::new() {
        let parsed = parser.parse_str(&text);
        let findings = analyze(&parsed, &AnalysisConfig::default());
        let _ = render_to_string(&findings);
    }
});
