pub const LANG_ID: &str = "sxs@0.1.0";

pub mod limits {
    pub const MAX_SOURCE_BYTES: usize = 65_536;
    pub const MAX_AST_NODES: usize = 50_000;
    pub const MAX_NEST_DEPTH: usize = 64;

    pub fn max_source_bytes() -> usize {
        match std::env::var("SX_MAX_SOURCE_BYTES") {
            Ok(v) => v
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(MAX_SOURCE_BYTES),
            Err(_) => MAX_SOURCE_BYTES,
        }
    }

    pub fn max_ast_nodes() -> usize {
        match std::env::var("SX_MAX_AST_NODES") {
            Ok(v) => v
                .parse::<usize>()
                .ok()
                .filter(|v| *v > 0)
                .unwrap_or(MAX_AST_NODES),
            Err(_) => MAX_AST_NODES,
        }
    }
}
