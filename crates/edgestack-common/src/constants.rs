//! System-wide constants and defaults.

/// Environment variable holding the deployment stage.
pub const STAGE_ENV: &str = "STAGE";

/// Environment variable holding the target account id.
pub const ACCOUNT_ENV: &str = "CDK_DEFAULT_ACCOUNT";

/// Environment variable holding the target region of the service stack.
pub const REGION_ENV: &str = "CDK_DEFAULT_REGION";

/// Stage used when `STAGE` is unset or empty.
pub const DEFAULT_STAGE: &str = "dev";

/// Apex domain that owns the hosted zone.
pub const DOMAIN_NAME: &str = "slippys.cool";

/// Subdomain label of the public service hostname.
pub const SUBDOMAIN: &str = "poc-fargate-ecs";

/// Region the certificate stack is pinned to.
pub const CERTIFICATE_REGION: &str = "us-east-1";

/// Default path of the lookup context file.
pub const DEFAULT_CONTEXT_FILE: &str = "edgestack.context.json";

/// Default output directory of `edgestack synth`.
pub const DEFAULT_OUTPUT_DIR: &str = "edgestack.out";

/// Name of the assembly manifest inside the output directory.
pub const MANIFEST_FILE: &str = "manifest.json";

/// Version string written into every manifest.
pub const ASSEMBLY_VERSION: &str = "36.0.0";

/// CloudFormation template format version.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Bootstrap qualifier used to name the container asset repository.
pub const BOOTSTRAP_QUALIFIER: &str = "hnb659fds";

/// Directory entries never included in an asset fingerprint.
pub const ASSET_EXCLUDES: &[&str] = &[
    ".git",
    "target",
    "node_modules",
    "cdk.out",
    DEFAULT_OUTPUT_DIR,
    DEFAULT_CONTEXT_FILE,
];

/// File that must exist at the root of a docker build context.
pub const DOCKERFILE: &str = "Dockerfile";

/// Application name used in CLI output.
pub const APP_NAME: &str = "edgestack";

/// Binary name for the CLI.
pub const BIN_NAME: &str = "edgestack";
