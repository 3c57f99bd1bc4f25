use chai_core::version::version_string;
use chai_core::VERSION;
use miette::Result;

pub fn run(json: bool) -> Result<()> {
    if json {
        super::print_json(&serde_json::json!({ "ok": true, "version": VERSION }));
    } else {
        println!("{}", version_string());
    }
    Ok(())
}
