pub mod workspace_util;
