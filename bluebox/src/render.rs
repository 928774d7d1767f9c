//! Stage configuration rendering.
//!
//! Rendering turns the builder's state into the configuration table each
//! boot stage reads at startup.

use bluebox_shared::errors::{BlueboxError, BlueboxResult};
use bluebox_shared::{table, EnvironmentAction, InitConfig, Program, SupervisorConfig};

/// Render the stage 1 table: the environment actions in execution order.
pub fn render_init(environment: &[EnvironmentAction]) -> BlueboxResult<Vec<u8>> {
    let config = InitConfig {
        environment: environment.to_vec(),
    };
    table::render(&config)
        .map_err(|e| BlueboxError::Generation(format!("Failed to render init: {}", e)))
}

/// Render the stage 2 table: the programs in execution order.
pub fn render_supervisor(programs: &[Program]) -> BlueboxResult<Vec<u8>> {
    let config = SupervisorConfig {
        programs: programs.to_vec(),
    };
    table::render(&config)
        .map_err(|e| BlueboxError::Generation(format!("Failed to render bluebox-init: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bluebox_shared::boot::standard_environment;

    #[test]
    fn init_table_keeps_action_order() {
        let env = standard_environment();
        let rendered = render_init(&env).unwrap();
        let decoded: InitConfig = serde_json::from_slice(&rendered).unwrap();
        assert_eq!(decoded.environment, env);
    }

    #[test]
    fn supervisor_table_keeps_program_order() {
        let programs = vec![
            Program::new("b", vec![]),
            Program::new("a", vec!["-x".into()]),
        ];
        let rendered = render_supervisor(&programs).unwrap();
        let decoded: SupervisorConfig = serde_json::from_slice(&rendered).unwrap();
        assert_eq!(decoded.programs, programs);
    }
}
