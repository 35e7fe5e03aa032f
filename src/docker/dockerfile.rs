/// Working directory the build context is copied into.
pub const WORKSPACE: &str = "/workspace";

/// First stage: the base image with the build context copied in.
pub fn base_stage(base_image: &str) -> String {
    format!("FROM {base_image}\nCOPY . {WORKSPACE}\nWORKDIR {WORKSPACE}\n")
}

/// One `RUN` layer on top of `from`.
pub fn run_stage(from: &str, command: &str) -> String {
    format!("FROM {from}\n{}\n", run_instruction(command))
}

/// `RUN` in exec form so quotes and newlines in `command` survive intact.
pub fn run_instruction(command: &str) -> String {
    let argv = ["/bin/sh", "-c", command];
    // Serializing a fixed array of &str cannot fail.
    let json = serde_json::to_string(&argv).unwrap_or_default();
    format!("RUN {json}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_stage_copies_context() {
        let df = base_stage("python:3.9");
        assert_eq!(
            df,
            "FROM python:3.9\nCOPY . /workspace\nWORKDIR /workspace\n"
        );
    }

    #[test]
    fn run_instruction_escapes_quotes_and_newlines() {
        let line = run_instruction("echo \"hi\"\necho done");
        assert_eq!(
            line,
            r#"RUN ["/bin/sh","-c","echo \"hi\"\necho done"]"#
        );
    }

    #[test]
    fn run_stage_starts_from_given_image() {
        let df = run_stage("dockwright-stage:1-0", "ls");
        assert!(df.starts_with("FROM dockwright-stage:1-0\n"));
        assert!(df.contains(r#"RUN ["/bin/sh","-c","ls"]"#));
    }
}
