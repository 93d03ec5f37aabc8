#[macro_export]
/// Implementation of the Kahan-Babushka-Neumaier algorithm for reduced numerical error in summation
///
/// <https://en.wikipedia.org/wiki/Kahan_summation_algorithm#Further_enhancements>
macro_rules! kbn_summation {
    (for $pat: pat in $expr: expr => {
        $('loop: { $(let $loopvar: ident = $loopvar_expr: expr;)* })?
        $($var: ident += $var_expr: expr;)*
    }) => {
        let ($($var,)*) = {
            use paste::paste;
            paste! {
                $(
                    let mut $var: f64 = 0.;
                    let mut [<$var compensation>] = 0.;
                )*
                    for $pat in $expr {
                        $($(let $loopvar = $loopvar_expr;)*)?
                        $(
                            let input = $var_expr;
                            let t = $var + input;
                            [<$var compensation>] += if $var.abs() >= input.abs() {
                                ($var - t) + input
                            } else {
                                (input - t) + $var
                            };
                            $var = t;
                        )*
                    }
                ($($var + [<$var compensation>],)*)
            }
        };
    };
}

/// Raise `base` to `exponent`.
///
/// Exponents that are a multiple of a quarter in `[0, 5]` are evaluated with
/// integer powers and square roots, which is much cheaper than [f64::powf].
/// Any other exponent falls through to [f64::powf].
pub fn pow(base: f64, exponent: f64) -> f64 {
    let quarters = exponent * 4.;
    if !(0. ..=20.).contains(&quarters) || quarters.fract() != 0. {
        return base.powf(exponent);
    }
    let quarters = quarters as i32;
    let whole = base.powi(quarters / 4);
    match quarters % 4 {
        0 => whole,
        1 => whole * base.sqrt().sqrt(),
        2 => whole * base.sqrt(),
        _ => whole * base.sqrt() * base.sqrt().sqrt(),
    }
}
