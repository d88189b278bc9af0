use std::error::Error;
use std::path::Path;

use test_utils::{check_diagnosed_failure, check_help_exits_successfully, check_run, check_type, Expected};

#[test]
fn let_binding_evaluates_arithmetic() -> Result<(), Box<dyn Error>> {
    check_run(
        Path::new("./tests/fixtures/let_binding.millie"),
        Expected {
            stdout: "7",
            stderr: "",
        },
    )
}

#[test]
fn lambda_application_evaluates() -> Result<(), Box<dyn Error>> {
    check_run(
        Path::new("./tests/fixtures/lambda_application.millie"),
        Expected {
            stdout: "42",
            stderr: "",
        },
    )
}

#[test]
fn let_rec_factorial_evaluates() -> Result<(), Box<dyn Error>> {
    check_run(
        Path::new("./tests/fixtures/factorial.millie"),
        Expected {
            stdout: "120",
            stderr: "",
        },
    )
}

#[test]
fn polymorphic_identity_evaluates_and_types() -> Result<(), Box<dyn Error>> {
    check_run(
        Path::new("./tests/fixtures/polymorphic_identity.millie"),
        Expected {
            stdout: "(1, true)",
            stderr: "",
        },
    )?;
    check_type(Path::new("./tests/fixtures/polymorphic_identity.millie"), "( int * bool )")
}

#[test]
fn negative_result_formats_as_signed_decimal() -> Result<(), Box<dyn Error>> {
    check_run(
        Path::new("./tests/fixtures/negative_result.millie"),
        Expected {
            stdout: "-7",
            stderr: "",
        },
    )
}

#[test]
fn if_expression_evaluates() -> Result<(), Box<dyn Error>> {
    check_run(
        Path::new("./tests/fixtures/if_expression.millie"),
        Expected {
            stdout: "1",
            stderr: "",
        },
    )
}

#[test]
fn function_value_formats_as_a_function() -> Result<(), Box<dyn Error>> {
    check_run(
        Path::new("./tests/fixtures/function_value.millie"),
        Expected {
            stdout: "A FUNCTION",
            stderr: "",
        },
    )?;
    check_type(Path::new("./tests/fixtures/function_value.millie"), "( 'A -> 'A )")
}

#[test]
fn adding_a_bool_to_an_int_is_a_diagnosed_failure() -> Result<(), Box<dyn Error>> {
    check_diagnosed_failure(Path::new("./tests/fixtures/type_mismatch.millie"))
}

#[test]
fn help_flag_exits_successfully() -> Result<(), Box<dyn Error>> {
    check_help_exits_successfully()
}
