//! Sample specs written against the [`aplusb`] summing component.
//!
//! They cover each registration form: single smoke cases (one passing, one failing on purpose), a parametrized
//! case whose payload is a delimited command string, a short spec, an expanded spec with shared members and
//! nested hooks, and a latent spec that checks its sum two seconds after it starts.

use std::time::Duration;

use aplusb::AplusB;

use crate::errors::{SpecResult, StepResult, UnrecoverableError};
use crate::registry::{Definition, Filter, Registry};
use crate::spec::{Scope, SuiteBuilder};

pub const SIMPLE_TEST: &str = "AplusB.SimpleTest.AplusB";
pub const SIMPLE_TEST_FAILED: &str = "AplusB.SimpleTest.AplusB failed";
pub const COMPLEX_TEST: &str = "AplusB.ComplexTest.AplusB";
pub const SPEC_SHORT: &str = "AplusB.SpecTest.Short";
pub const SPEC_EXPANDED: &str = "AplusB.SpecTest.Expanded";
pub const SPEC_LATENT: &str = "AplusB.SpecTest.LatentExample";

/// Register every demo spec.
pub fn register_all(registry: &mut Registry) -> SpecResult<()> {
    registry.register(
        Definition::case(SIMPLE_TEST, |scope| {
            scope.test_equal("sum of our feature", AplusB::default().sum(11, 22), 11 + 22);
        })
        .filter(Filter::Smoke),
    )?;
    registry.register(
        Definition::case(SIMPLE_TEST_FAILED, |scope| {
            // Compares against the real sum, so this case always fails. Comparing against 11 + 11 would pass.
            scope.test_not_equal("intentionally failed sum check", AplusB::default().sum(11, 22), 11 + 22);
        })
        .filter(Filter::Smoke),
    )?;
    registry.complex(COMPLEX_TEST, sum_commands, |scope, command: &String| {
        check_sum_command(scope, command)
    })?;
    registry.describe(SPEC_SHORT, define_short)?;
    registry.describe(SPEC_EXPANDED, define_expanded)?;
    registry.describe(SPEC_LATENT, define_latent)?;
    Ok(())
}

/// Every `(i, j)` pair of a 3×3 grid, as `"i,j,i+j"` commands.
fn sum_commands() -> Vec<(String, String)> {
    let mut commands = Vec::with_capacity(9);
    for i in 0..3 {
        for j in 0..3 {
            commands.push((format!("Sum of {i} and {j}"), format!("{i},{j},{}", i + j)));
        }
    }
    commands
}

fn check_sum_command(scope: &mut Scope<'_>, command: &str) {
    let parts: Vec<&str> = command.split(',').filter(|part| !part.is_empty()).collect();
    if !scope.test_equal("number of input parameters", parts.len(), 3) {
        return;
    }
    let Some(a) = parse_operand(scope, "a is numeric", parts[0]) else {
        return;
    };
    let Some(b) = parse_operand(scope, "b is numeric", parts[1]) else {
        return;
    };
    let Some(expected) = parse_operand(scope, "expected result is numeric", parts[2]) else {
        return;
    };
    scope.test_equal("sum equals expected result", AplusB::default().sum(a, b), expected);
}

fn parse_operand(scope: &mut Scope<'_>, what: &str, text: &str) -> Option<i16> {
    let value = text.trim().parse::<i16>().ok();
    scope.test_some(what, value.as_ref());
    value
}

fn define_short(spec: &mut SuiteBuilder<'_>) {
    spec.describe("Sum testing", |s| {
        s.it("Should correctly sum 0 with 0", |scope| {
            scope.test_equal("sum of two zeros", AplusB::default().sum(0, 0), 0);
        });
        s.it("Should correctly sum -100 with 100", |scope| {
            scope.test_equal("sum of -100 and 100", AplusB::default().sum(-100, 100), 0);
        });
        s.it("Should correctly sum class members a&b", |scope| {
            let feature = AplusB::default();
            scope.test_equal("sum of members", feature.sum(feature.a, feature.b), feature.a + feature.b);
        });
    });
}

fn shared_object(scope: &mut Scope<'_>) -> Result<AplusB, UnrecoverableError> {
    let object = scope.get::<AplusB>("object").copied();
    scope.require_some("AplusB object created in before_each", object)
}

fn define_expanded(spec: &mut SuiteBuilder<'_>) {
    spec.describe("Sum testing", |s| {
        s.before_each(|scope| {
            scope.set("object", AplusB::default());
            scope.set("c", 13_i32);
        });

        s.it("Should correctly sum 0 with 999", |scope| -> StepResult {
            let object = shared_object(scope)?;
            scope.test_equal("summing 0 with 999", object.sum(0, 999), 999);
            Ok(())
        });

        s.it("Should overflow while summing two numbers", |scope| -> StepResult {
            let object = shared_object(scope)?;
            scope.test_not_equal(
                "summing maxint16 with 1",
                i32::from(object.sum(0x7FFF, 0x0001)),
                0x7FFF + 0x0001,
            );
            Ok(())
        });

        s.x_it("Should not be called at all", |scope| {
            let pending = "some check that does not work yet";
            scope.test_true("disabled cases never run", pending.is_empty());
        });

        s.describe("Nested testing", |s| {
            // Outer hooks wrap nested cases; these hooks never reach outer cases.
            s.before_each(|scope| {
                if let Some(c) = scope.get_mut::<i32>("c") {
                    *c += 10;
                }
            });
            s.it("Checking c is 23 in nested describe block", |scope| {
                let c = scope.get::<i32>("c").copied();
                scope.test_equal("c is 23", c, Some(23));
            });
        });

        s.it("Class member still should be 13", |scope| {
            let c = scope.get::<i32>("c").copied();
            scope.test_equal("c is still 13", c, Some(13));
        });

        s.after_each(|scope| {
            scope.context_mut().remove("object");
        });
    });
}

fn define_latent(spec: &mut SuiteBuilder<'_>) {
    spec.describe("Latent(multiframe) test", |s| {
        s.latent_it(
            "Should check sum of 1 & 1, but only two seconds later",
            |scope, done| {
                scope.after(Duration::from_secs(2), move || {
                    done.execute_with(|scope| {
                        scope.test_equal("sum of two ones", AplusB::default().sum(1, 1), 2);
                    });
                });
            },
        );
    });
}
