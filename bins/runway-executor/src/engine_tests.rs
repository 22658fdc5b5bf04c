/// Docker-backed sandbox tests
///
/// These need a local Docker daemon and pull the language images on first
/// run. Run with `cargo test -p runway-executor -- --ignored`.

#[cfg(test)]
mod sandbox_tests {
    use crate::config::SandboxPolicy;
    use crate::engine::DockerEngine;
    use crate::languages::LanguageConfigManager;
    use runway_common::{Language, RunwayError};
    use std::time::Duration;

    fn engine() -> DockerEngine {
        DockerEngine::new(LanguageConfigManager::new(None, 512), SandboxPolicy::default())
            .expect("Failed to create Docker engine")
    }

    async fn assert_hello(language: Language, code: &str) {
        let output = engine().run(language, code).await.expect("execution should succeed");
        assert_eq!(output.exit_status, Some(0), "output: {}", output.output);
        assert!(
            output.output.contains("Hello, World!"),
            "unexpected output for {}: {}",
            language,
            output.output
        );
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_python_hello() {
        assert_hello(Language::Python, "print('Hello, World!')").await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_javascript_hello() {
        assert_hello(Language::JavaScript, "console.log('Hello, World!');").await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_c_hello() {
        assert_hello(
            Language::C,
            "#include <stdio.h>\nint main(){printf(\"Hello, World!\\n\");return 0;}",
        )
        .await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_cpp_hello() {
        assert_hello(
            Language::Cpp,
            "#include <iostream>\nint main(){std::cout<<\"Hello, World!\"<<std::endl;}",
        )
        .await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker and `runway-cli build-image --language typescript`
    async fn test_typescript_hello() {
        assert_hello(
            Language::TypeScript,
            "const greeting: string = 'Hello, World!';\nconsole.log(greeting);",
        )
        .await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_java_hello() {
        assert_hello(
            Language::Java,
            "public class Main { public static void main(String[] a) { System.out.println(\"Hello, World!\"); } }",
        )
        .await;
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_stdout_and_stderr_are_merged() {
        let output = engine()
            .run(
                Language::Python,
                "import sys\nprint('out', flush=True)\nprint('err', file=sys.stderr, flush=True)",
            )
            .await
            .unwrap();
        assert!(output.output.contains("out"));
        assert!(output.output.contains("err"));
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_nonzero_exit_still_returns_output() {
        let output = engine()
            .run(Language::Python, "print('partial')\nraise SystemExit(3)")
            .await
            .unwrap();
        assert_eq!(output.exit_status, Some(3));
        assert!(output.output.contains("partial"));
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_infinite_loop_times_out() {
        let policy = SandboxPolicy {
            timeout: Duration::from_secs(3),
            ..SandboxPolicy::default()
        };
        let engine = DockerEngine::new(LanguageConfigManager::new(None, 512), policy).unwrap();
        // Pull the image first so only the run itself is timed
        engine.run(Language::Python, "pass").await.unwrap();

        let started = std::time::Instant::now();
        let err = engine.run(Language::Python, "while True: pass").await.unwrap_err();
        let elapsed = started.elapsed();
        assert_eq!(err, RunwayError::ExecutionTimeout(3000));
        assert!(elapsed >= Duration::from_secs(3), "returned early: {:?}", elapsed);
        assert!(elapsed <= Duration::from_secs(5), "teardown took too long: {:?}", elapsed);
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_network_is_unreachable() {
        let output = engine()
            .run(
                Language::Python,
                "import socket\ntry:\n    socket.create_connection(('1.1.1.1', 53), timeout=2)\n    print('connected')\nexcept OSError:\n    print('isolated')",
            )
            .await
            .unwrap();
        assert!(output.output.contains("isolated"), "output: {}", output.output);
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn test_runs_as_non_root() {
        let output = engine()
            .run(Language::Python, "import os\nprint(os.getuid())")
            .await
            .unwrap();
        assert_eq!(output.output.trim(), "1001");
    }

    #[tokio::test]
    async fn test_oversized_source_rejected_before_docker() {
        // Only needs a Docker client handle, not a reachable daemon
        let Ok(engine) = DockerEngine::new(LanguageConfigManager::new(None, 512), SandboxPolicy::default()) else {
            return;
        };
        let code = "x".repeat(crate::engine::MAX_SOURCE_CODE_BYTES + 1);
        let err = engine.run(Language::Python, &code).await.unwrap_err();
        assert!(matches!(err, RunwayError::Validation(_)));
    }
}
