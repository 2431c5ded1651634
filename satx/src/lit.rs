//! Test-only helpers for literals and variables.
//!
//! The actual `Lit`/`Var`/`LitIdx` types live in `satx_formula::lit`. This module only provides
//! shorthand macros and proptest strategies used throughout this crate's test code.

/// Shortcut for tests
#[cfg(test)]
#[allow(unused_macros)]
macro_rules! lit {
    ($x:expr) => {
        satx_formula::lit::Lit::from_dimacs($x)
    };
}

/// Shortcut for tests
#[cfg(test)]
#[allow(unused_macros)]
macro_rules! var {
    ($x:expr) => {
        satx_formula::lit::Var::from_dimacs($x)
    };
}

/// Shortcut for tests
#[cfg(test)]
#[allow(unused_macros)]
macro_rules! lits {
    ( $( $x:expr ),* ) => { [ $( lit!( $x ) ),* ] };
    ( $( $x:expr ),* , ) => { lits! [ $( $ x),* ] };
}

/// Shortcut for tests
#[cfg(test)]
#[allow(unused_macros)]
macro_rules! vars {
    ( $( $x:expr ),* ) => { [ $( var!( $x ) ),* ] };
    ( $( $x:expr ),* , ) => { vars! [ $( $ x),* ] };
}

/// Shortcut for tests
#[cfg(test)]
#[allow(unused_macros)]
macro_rules! cnf {
    ( $( $( $x:expr ),* );* ; ) => { [ $( &[ $( lit!( $x ) ),* ] as &[satx_formula::lit::Lit] ),* ] };
}

/// Shortcut for tests
#[cfg(test)]
#[allow(unused_macros)]
macro_rules! cnf_formula {
    ( $( $t:tt )* ) => { satx_formula::cnf::CnfFormula::from(cnf![ $($t)* ].iter().cloned()) };
}

#[cfg(test)]
pub mod strategy {
    use proptest::{prelude::*, *};
    use satx_formula::lit::{Lit, Var};

    pub fn var(index: impl Strategy<Value = usize>) -> impl Strategy<Value = Var> {
        index.prop_map(Var::from_index)
    }

    pub fn lit(index: impl Strategy<Value = usize>) -> impl Strategy<Value = Lit> {
        (var(index), bool::ANY).prop_map(|(var, negative)| Lit::from_var(var, negative))
    }
}
